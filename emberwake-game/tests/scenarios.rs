use emberwake_game::{
    ActiveDialogue, Direction, GameContent, GamePhase, GameSession, InteractionOutcome,
    MoveOutcome, PlayerPosition, QuestError, QuestStatus, SessionConfig, WildTrigger,
};
use std::sync::Arc;

fn demo_session(seed: u64) -> GameSession {
    let content = Arc::new(GameContent::demo().expect("demo content"));
    GameSession::new_game(content, SessionConfig::default(), seed).expect("new game")
}

fn exploring(seed: u64) -> GameSession {
    let mut game = demo_session(seed);
    game.skip_intro().expect("skip intro");
    game
}

fn place(game: &mut GameSession, map_id: &str, x: i32, y: i32, facing: Direction) {
    game.state_mut().position = PlayerPosition::new(map_id, x, y, facing);
}

fn objective_progress(game: &GameSession, quest_id: &str, objective_id: &str) -> (u32, bool) {
    let progress = game
        .state()
        .quests
        .progress(quest_id)
        .and_then(|p| p.objective(objective_id))
        .expect("objective tracked");
    (progress.current_progress, progress.is_complete)
}

#[test]
fn new_game_starts_in_intro_with_one_member() {
    let game = demo_session(1);
    assert_eq!(game.phase(), GamePhase::IntroCinematic);
    let members = game.state().party.members();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, game.content().start.character);
    assert!(game.state().quests.is_empty());
    assert_eq!(
        game.state().inventory.gold,
        SessionConfig::default().starting_gold
    );
}

#[test]
fn chest_credits_once_then_reports_empty() {
    let mut game = exploring(2);
    place(&mut game, "ashford", 7, 3, Direction::Up);
    let gold = game.state().inventory.gold;

    let first = game.interact();
    assert!(matches!(
        first,
        InteractionOutcome::Treasure { ref message, gold: 50, .. } if message == "Found: Potion, 50 Gold!"
    ));
    assert_eq!(game.state().inventory.gold, gold + 50);
    assert_eq!(game.state().inventory.quantity("potion"), 1);

    let second = game.interact();
    assert!(matches!(
        second,
        InteractionOutcome::AlreadyDone { ref message, .. } if message == "The chest is empty."
    ));
    assert_eq!(game.state().inventory.gold, gold + 50);
    assert_eq!(game.state().inventory.quantity("potion"), 1);
}

#[test]
fn collect_objective_completes_exactly_at_target() {
    let mut game = exploring(3);
    game.start_quest("moonherb_gathering").unwrap();

    place(&mut game, "whisperwood", 4, 3, Direction::Up);
    assert!(matches!(
        game.interact(),
        InteractionOutcome::Collected { quantity: 1, .. }
    ));
    place(&mut game, "whisperwood", 8, 3, Direction::Up);
    assert!(matches!(
        game.interact(),
        InteractionOutcome::Collected { quantity: 1, .. }
    ));
    assert_eq!(
        objective_progress(&game, "moonherb_gathering", "gather"),
        (2, false)
    );

    place(&mut game, "whisperwood", 6, 4, Direction::Down);
    assert!(matches!(
        game.interact(),
        InteractionOutcome::Collected { quantity: 1, .. }
    ));
    assert_eq!(
        objective_progress(&game, "moonherb_gathering", "gather"),
        (3, true)
    );
    // Completion is never inferred from objectives.
    assert_eq!(
        game.state().quests.status("moonherb_gathering"),
        QuestStatus::Active
    );
}

const STEP_FIELD: &str = r#"{
    "start": { "map_id": "meadow", "x": 1, "y": 0, "character": "hero" },
    "characters": [{ "id": "hero", "name": "Hero", "hp": 30, "max_hp": 30 }],
    "enemies": [{ "id": "slime", "name": "Slime", "hp": 5 }],
    "maps": [{
        "id": "meadow", "name": "Meadow", "width": 3, "height": 1,
        "encounter_zones": [{ "x": 0, "y": 0, "width": 3, "height": 1, "enemies": ["slime"] }]
    }]
}"#;

#[test]
fn step_counter_fires_between_eight_and_twenty_steps() {
    let content = Arc::new(GameContent::from_json(STEP_FIELD).unwrap());
    for seed in 0..64 {
        let mut game =
            GameSession::new_game(Arc::clone(&content), SessionConfig::default(), seed).unwrap();
        game.skip_intro().unwrap();
        let mut fired_at = None;
        for step in 1..=20u32 {
            let dx = if step % 2 == 1 { 1 } else { -1 };
            match game.move_by(dx, 0) {
                MoveOutcome::Moved {
                    wild_encounter: Some(encounter),
                } => {
                    assert_eq!(encounter.trigger, WildTrigger::StepCounter);
                    fired_at = Some(step);
                    break;
                }
                MoveOutcome::Moved {
                    wild_encounter: None,
                } => {}
                other => panic!("seed {seed}: unexpected {other:?}"),
            }
        }
        let fired_at = fired_at.unwrap_or_else(|| panic!("seed {seed}: no encounter by step 20"));
        assert!(fired_at >= 8, "seed {seed}: fired after {fired_at} steps");
        assert!(game.state().transition.has_pending_encounter());
    }
}

#[test]
fn locked_gate_moves_player_and_shows_message() {
    let mut game = exploring(4);
    place(&mut game, "ashford", 7, 4, Direction::Left);

    let outcome = game.move_by(1, 0);
    assert_eq!(
        outcome,
        MoveOutcome::GateLocked {
            event_id: "east_gate".to_string(),
            message: "The gate is barred. Speak with the elder first.".to_string(),
        }
    );
    let position = &game.state().position;
    assert_eq!((position.x, position.y), (8, 4));
    assert_eq!(position.map_id, "ashford");
    assert!(!game.state().transition.has_pending());
    assert_eq!(game.phase(), GamePhase::Dialogue);
    assert!(matches!(
        game.state().dialogue.active(),
        Some(ActiveDialogue::Message { text, .. }) if text.starts_with("The gate is barred")
    ));

    game.end_dialogue();
    assert_eq!(game.phase(), GamePhase::Exploring);
}

#[test]
fn starting_an_active_quest_changes_nothing() {
    let mut game = exploring(5);
    game.start_quest("wolf_cull").unwrap();
    let before = game.state().quests.clone();
    assert_eq!(
        game.start_quest("wolf_cull"),
        Err(QuestError::AlreadyActive("wolf_cull".to_string()))
    );
    assert_eq!(game.state().quests, before);
}

#[test]
fn quest_prerequisites_are_checked_at_call_time() {
    let mut game = exploring(6);
    assert!(matches!(
        game.start_quest("guardian_trial"),
        Err(QuestError::MissingPrerequisite { .. })
    ));
    game.start_quest("moonherb_gathering").unwrap();
    game.complete_quest("moonherb_gathering").expect("completes");
    assert!(game.start_quest("guardian_trial").is_ok());
}

#[test]
fn objective_progress_never_decreases_or_overshoots() {
    let mut game = exploring(7);
    game.start_quest("moonherb_gathering").unwrap();
    assert!(
        game.update_objective_progress("moonherb_gathering", "gather", 2)
            .is_some()
    );
    assert!(
        game.update_objective_progress("moonherb_gathering", "gather", 1)
            .is_none()
    );
    assert_eq!(
        objective_progress(&game, "moonherb_gathering", "gather"),
        (2, false)
    );
    let update = game
        .update_objective_progress("moonherb_gathering", "gather", 40)
        .expect("advances");
    assert_eq!((update.progress, update.target), (3, 3));
    assert!(update.completed_now);
    assert!(
        game.update_objective_progress("moonherb_gathering", "gather", 50)
            .is_none()
    );
    assert_eq!(
        objective_progress(&game, "moonherb_gathering", "gather"),
        (3, true)
    );
}

#[test]
fn finalized_rewards_are_stable_until_the_battle_ends() {
    let mut game = exploring(8);
    game.start_quest("moonherb_gathering").unwrap();
    game.complete_quest("moonherb_gathering").unwrap();
    game.start_quest("guardian_trial").unwrap();
    game.state_mut().flags.set("trial_accepted");
    place(&mut game, "whisperwood", 9, 3, Direction::Left);

    let outcome = game.move_by(1, 0);
    assert_eq!(
        outcome,
        MoveOutcome::ScriptedBattle {
            event_id: "grove_guardian".to_string(),
            dialogue: Some("guardian_challenge".to_string()),
        }
    );
    assert_eq!(game.state().position.x, 9);
    game.advance_dialogue();
    assert!(game.state().transition.has_pending_encounter());
    game.on_transition_complete();
    assert_eq!(game.phase(), GamePhase::Combat);

    let first = game.finalize_rewards().expect("battle live");
    let second = game.finalize_rewards().expect("battle live");
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );

    let report = game.end_battle(true).expect("battle ends");
    assert_eq!(report.rewards.as_ref(), Some(&first));
    assert!(game.state().flags.is_set("guardian_defeated"));
    assert_eq!(game.state().inventory.quantity("guardian_seed"), 1);
    assert_eq!(
        objective_progress(&game, "guardian_trial", "defeat_guardian"),
        (1, true)
    );
    assert_eq!(game.phase(), GamePhase::Exploring);
    assert!(game.end_battle(true).is_none());
}

#[test]
fn defeat_leads_to_game_over_without_rewards() {
    let mut game = exploring(9);
    game.state_mut().flags.set("trial_accepted");
    place(&mut game, "whisperwood", 9, 3, Direction::Right);
    game.interact();
    game.advance_dialogue();
    game.on_transition_complete();
    assert_eq!(game.phase(), GamePhase::Combat);

    let gold = game.state().inventory.gold;
    let report = game.end_battle(false).expect("battle ends");
    assert!(!report.victory);
    assert_eq!(game.phase(), GamePhase::GameOver);
    assert_eq!(game.state().inventory.gold, gold);
    assert!(!game.state().flags.is_set("guardian_defeated"));

    game.return_to_title().unwrap();
    assert_eq!(game.phase(), GamePhase::Title);
}
