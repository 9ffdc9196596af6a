use emberwake_game::{
    AppliedTransition, BlockReason, Cart, CartLine, Direction, GameContent, GamePhase,
    GameSession, InteractionOutcome, MoveOutcome, Notification, PlayerPosition, QuestStatus,
    SessionConfig, ShopError,
};
use std::sync::Arc;

fn exploring(seed: u64) -> GameSession {
    let _ = env_logger::builder().is_test(true).try_init();
    let content = Arc::new(GameContent::demo().expect("demo content"));
    let mut game = GameSession::new_game(content, SessionConfig::default(), seed).expect("new game");
    game.finish_intro().expect("boot");
    game.finish_boot().expect("exploring");
    game
}

/// Win whatever battle is staged.
fn win_pending_battle(game: &mut GameSession) {
    let applied = game.on_transition_complete();
    assert!(
        matches!(applied, Some(AppliedTransition::BattleStarted { .. })),
        "{applied:?}"
    );
    assert_eq!(game.phase(), GamePhase::Combat);
    let report = game.end_battle(true).expect("battle resolves");
    assert!(report.victory);
    assert_eq!(game.phase(), GamePhase::Exploring);
}

/// One step; wild battles along the way are won on the spot.
fn step(game: &mut GameSession, dx: i32, dy: i32) -> MoveOutcome {
    let outcome = game.move_by(dx, dy);
    if matches!(
        outcome,
        MoveOutcome::Moved {
            wild_encounter: Some(_)
        }
    ) {
        win_pending_battle(game);
    }
    outcome
}

fn walk(game: &mut GameSession, dx: i32, dy: i32, steps: usize) {
    for _ in 0..steps {
        let outcome = step(game, dx, dy);
        assert!(
            matches!(outcome, MoveOutcome::Moved { .. }),
            "blocked at {:?}: {outcome:?}",
            game.state().position
        );
    }
}

fn teleport(game: &mut GameSession, dx: i32, dy: i32, map_id: &str) {
    let outcome = step(game, dx, dy);
    assert_eq!(
        outcome,
        MoveOutcome::Teleporting {
            map_id: map_id.to_string()
        }
    );
    let applied = game.on_transition_complete();
    assert_eq!(
        applied,
        Some(AppliedTransition::MapChanged {
            map_id: map_id.to_string()
        })
    );
    assert_eq!(game.state().position.map_id, map_id);
}

fn at(game: &GameSession) -> (i32, i32) {
    (game.state().position.x, game.state().position.y)
}

fn pick_herb(game: &mut GameSession, dx: i32, dy: i32, event_id: &str) {
    assert!(matches!(
        game.move_by(dx, dy),
        MoveOutcome::Blocked { reason: BlockReason::Event(ref id), .. } if id == event_id
    ));
    assert!(matches!(
        game.interact(),
        InteractionOutcome::Collected { event_id: ref id, .. } if id == event_id
    ));
}

#[test]
fn demo_quest_line_runs_to_completion() {
    let mut game = exploring(2024);

    // Ashford: accept the moonherb errand.
    walk(&mut game, 1, 0, 2);
    walk(&mut game, 0, -1, 2);
    assert_eq!(at(&game), (4, 3));
    let talk = game.interact();
    assert!(matches!(
        talk,
        InteractionOutcome::Talk { ref npc_id, node_id: Some(ref node), .. }
            if npc_id == "elder_maren" && node == "elder_intro"
    ));
    let accepted = game.choose(0).expect("choice offered");
    assert_eq!(accepted.report.started_quests, vec!["moonherb_gathering"]);
    assert!(game.advance_dialogue().ended());
    assert!(game.state().flags.is_set("gate_open"));

    // Whisperwood: three moonherbs.
    walk(&mut game, 0, 1, 1);
    walk(&mut game, 1, 0, 3);
    teleport(&mut game, 1, 0, "whisperwood");
    assert_eq!(at(&game), (1, 3));
    assert_eq!(game.state().position.facing, Direction::Right);

    walk(&mut game, 1, 0, 3);
    pick_herb(&mut game, 0, -1, "herb_a");
    walk(&mut game, 1, 0, 4);
    pick_herb(&mut game, 0, -1, "herb_c");
    walk(&mut game, 0, 1, 2);
    walk(&mut game, -1, 0, 1);
    pick_herb(&mut game, -1, 0, "herb_b");
    assert_eq!(game.state().inventory.quantity("moonherb"), 3);
    assert!(
        game.state()
            .quests
            .is_objective_complete("moonherb_gathering", "gather")
    );

    // Back to the elder: delivery, reward, and the next quest.
    walk(&mut game, 0, -1, 2);
    walk(&mut game, -1, 0, 6);
    teleport(&mut game, -1, 0, "ashford");
    assert_eq!(at(&game), (7, 4));
    walk(&mut game, -1, 0, 3);
    walk(&mut game, 0, -1, 1);
    let gold_before = game.state().inventory.gold;
    let potions_before = game.state().inventory.quantity("potion");
    let talk = game.interact();
    assert!(matches!(
        talk,
        InteractionOutcome::Talk { node_id: Some(ref node), ref objective_updates, .. }
            if node == "elder_thanks" && objective_updates.iter().any(|u| u.objective_id == "deliver")
    ));
    assert_eq!(
        game.state().quests.status("moonherb_gathering"),
        QuestStatus::Completed
    );
    assert_eq!(game.state().inventory.quantity("moonherb"), 0);
    assert_eq!(game.state().inventory.gold, gold_before + 60);
    assert_eq!(game.state().inventory.quantity("potion"), potions_before + 2);
    assert!(game.state().flags.is_set("elder_trusts_you"));
    let offer = game.advance_dialogue();
    assert_eq!(offer.node_id.as_deref(), Some("elder_trial_offer"));
    game.choose(0).expect("accept the trial");
    assert!(game.advance_dialogue().ended());
    assert!(game.state().quests.is_active("guardian_trial"));

    // The grove guardian.
    walk(&mut game, 0, 1, 1);
    walk(&mut game, 1, 0, 3);
    teleport(&mut game, 1, 0, "whisperwood");
    walk(&mut game, 1, 0, 8);
    assert_eq!(at(&game), (9, 3));
    assert_eq!(
        step(&mut game, 1, 0),
        MoveOutcome::ScriptedBattle {
            event_id: "grove_guardian".to_string(),
            dialogue: Some("guardian_challenge".to_string()),
        }
    );
    assert_eq!(game.phase(), GamePhase::Dialogue);
    assert!(game.advance_dialogue().ended());
    win_pending_battle(&mut game);
    assert!(game.state().flags.is_set("guardian_defeated"));
    assert_eq!(at(&game), (9, 3));

    // Relight the shrine.
    walk(&mut game, 0, 1, 1);
    walk(&mut game, 1, 0, 1);
    assert!(matches!(
        game.move_by(0, 1),
        MoveOutcome::Blocked { reason: BlockReason::Event(ref id), .. } if id == "forest_shrine"
    ));
    assert!(matches!(
        game.interact(),
        InteractionOutcome::Triggered { ref event_id, .. } if event_id == "forest_shrine"
    ));
    assert_eq!(game.phase(), GamePhase::Dialogue);
    assert!(game.advance_dialogue().ended());
    assert!(game.state().flags.is_set("shrine_lit"));

    // The spent battle tile is now walkable; report back.
    walk(&mut game, 0, -1, 1);
    assert_eq!(at(&game), (10, 3));
    walk(&mut game, -1, 0, 9);
    teleport(&mut game, -1, 0, "ashford");
    walk(&mut game, -1, 0, 3);
    walk(&mut game, 0, -1, 1);
    game.drain_notifications();
    let talk = game.interact();
    assert!(matches!(
        talk,
        InteractionOutcome::Talk { node_id: Some(ref node), .. } if node == "elder_trial_report"
    ));
    assert!(game.advance_dialogue().ended());

    let state = game.state();
    assert_eq!(state.quests.status("guardian_trial"), QuestStatus::Completed);
    assert_eq!(state.party.len(), 2);
    assert!(state.party.contains("lys"));
    assert_eq!(state.inventory.quantity("shrine_charm"), 1);
    assert_eq!(state.inventory.quantity("guardian_seed"), 1);
    assert!(state.visited_maps.contains("whisperwood"));
    let whisperwood = game.content().maps.get("whisperwood").expect("map");
    assert!(whisperwood.npc_at(2, 6, &state.flags).is_none());

    let notifications = game.drain_notifications();
    assert!(notifications.contains(&Notification::Recruited("lys".to_string())));
    assert!(notifications.iter().any(
        |n| matches!(n, Notification::QuestCompleted(payload) if payload.quest_id == "guardian_trial")
    ));
}

#[test]
fn shopkeeper_dialogue_opens_the_shop_after_closing() {
    let mut game = exploring(11);
    game.state_mut().position = PlayerPosition::new("ashford", 4, 4, Direction::Down);
    assert!(matches!(
        game.move_by(-1, 0),
        MoveOutcome::Blocked { reason: BlockReason::Npc(ref id), .. } if id == "trader_olin"
    ));
    assert!(matches!(game.interact(), InteractionOutcome::Talk { .. }));

    let outcome = game.choose(0).expect("browse");
    assert!(outcome.ended());
    assert_eq!(game.phase(), GamePhase::Shop);
    assert_eq!(game.state().shop.as_deref(), Some("ashford_general"));

    let gold = game.state().inventory.gold;
    let purchase = game.buy("potion", 2).expect("affordable");
    assert_eq!(purchase.total, 40);
    assert_eq!(game.state().inventory.gold, gold - 40);
    assert_eq!(game.state().inventory.quantity("potion"), 2);
    assert!(game.buy("shrine_charm", 1).is_err());

    let refund = game.sell("potion", 1).expect("sellable");
    assert_eq!(refund, 10);
    game.leave_shop().expect("leave");
    assert_eq!(game.phase(), GamePhase::Exploring);
    assert!(game.buy("potion", 1).is_err());
}

#[test]
fn sparring_choice_stages_a_battle_once_dialogue_closes() {
    let mut game = exploring(12);
    game.state_mut().position = PlayerPosition::new("whisperwood", 2, 5, Direction::Down);
    assert!(matches!(game.interact(), InteractionOutcome::Talk { .. }));
    let spar = game.choose(0).expect("spar");
    assert_eq!(spar.node_id.as_deref(), Some("lys_spar"));
    assert!(!game.state().transition.has_pending());

    assert!(game.advance_dialogue().ended());
    assert!(game.state().transition.has_pending_encounter());
    assert_eq!(
        game.move_by(0, -1),
        MoveOutcome::Blocked {
            facing: Direction::Up,
            reason: BlockReason::PendingTransition,
        }
    );
    win_pending_battle(&mut game);
}

#[test]
fn inn_and_save_point_raise_requests() {
    let mut game = exploring(13);
    game.state_mut().position = PlayerPosition::new("ashford", 3, 2, Direction::Left);
    game.state_mut().party.members_mut()[0].hp = 5;
    assert_eq!(
        game.interact(),
        InteractionOutcome::RestRequested {
            event_id: "ashford_inn".to_string(),
            cost: 20,
        }
    );
    let gold = game.state().inventory.gold;
    assert_eq!(game.confirm_rest(), Ok(20));
    assert_eq!(game.state().inventory.gold, gold - 20);
    let leader = game.state().party.leader().expect("leader");
    assert_eq!(leader.hp, leader.max_hp);
    assert!(game.confirm_rest().is_err());

    game.state_mut().position = PlayerPosition::new("ashford", 5, 5, Direction::Down);
    assert_eq!(game.interact(), InteractionOutcome::SaveRequested);
    assert!(game.state().ui.save_requested);
    game.dismiss_requests();
    assert!(!game.state().ui.save_requested);
}

#[test]
fn split_cart_lines_cannot_overfill_a_stack() {
    let mut game = exploring(15);
    game.state_mut().position = PlayerPosition::new("ashford", 4, 4, Direction::Left);
    assert!(matches!(game.interact(), InteractionOutcome::Talk { .. }));
    game.choose(0).expect("browse");
    assert_eq!(game.phase(), GamePhase::Shop);
    game.state_mut().inventory.gold = 100_000;
    game.drain_notifications();

    let line = |quantity| CartLine {
        item_id: "potion".to_string(),
        quantity,
    };
    let cart = Cart {
        lines: vec![line(60), line(60)],
    };
    assert_eq!(
        game.checkout(&cart),
        Err(ShopError::StackFull {
            item_id: "potion".to_string(),
            requested: 120,
            room: 99,
        })
    );
    assert_eq!(game.state().inventory.gold, 100_000);
    assert_eq!(game.state().inventory.quantity("potion"), 0);
    assert!(game.drain_notifications().is_empty());

    let cart = Cart {
        lines: vec![line(2), line(1)],
    };
    assert_eq!(game.checkout(&cart).expect("fits").total, 60);
    assert_eq!(game.state().inventory.quantity("potion"), 3);
    let obtained: Vec<u32> = game
        .drain_notifications()
        .into_iter()
        .filter_map(|note| match note {
            Notification::ItemObtained { item_id, quantity } if item_id == "potion" => {
                Some(quantity)
            }
            _ => None,
        })
        .collect();
    assert_eq!(obtained, vec![2, 1]);
}

#[test]
fn rest_offer_lapses_once_the_player_moves_on() {
    let mut game = exploring(16);
    game.state_mut().position = PlayerPosition::new("ashford", 3, 2, Direction::Left);
    game.state_mut().party.members_mut()[0].hp = 1;
    assert!(matches!(
        game.interact(),
        InteractionOutcome::RestRequested { .. }
    ));
    let gold = game.state().inventory.gold;

    assert!(matches!(game.move_by(0, 1), MoveOutcome::Moved { .. }));
    assert!(game.state().ui.rest_request.is_none());
    assert_eq!(game.confirm_rest(), Err(ShopError::Closed));
    assert_eq!(game.state().party.leader().expect("leader").hp, 1);
    assert_eq!(game.state().inventory.gold, gold);

    game.state_mut().position = PlayerPosition::new("ashford", 3, 2, Direction::Left);
    assert!(matches!(
        game.interact(),
        InteractionOutcome::RestRequested { .. }
    ));
    game.start_cutscene("bells").expect("cutscene");
    assert_eq!(game.confirm_rest(), Err(ShopError::Closed));
    game.end_cutscene().expect("back to exploring");
    assert_eq!(game.confirm_rest(), Err(ShopError::Closed));
    assert_eq!(game.state().party.leader().expect("leader").hp, 1);
}

#[test]
fn menu_blocks_movement_until_closed() {
    let mut game = exploring(14);
    assert!(game.toggle_menu());
    assert_eq!(game.move_by(1, 0), MoveOutcome::Ignored);
    assert!(!game.toggle_menu());
    assert!(matches!(game.move_by(1, 0), MoveOutcome::Moved { .. }));
}
