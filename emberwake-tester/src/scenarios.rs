//! Scripted logic scenarios against the bundled demo world.
use anyhow::{Context, Result, bail, ensure};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use emberwake_game::{
    DemoContentLoader, Direction, GameEngine, GamePhase, GameSession, InteractionOutcome,
    MemorySlotStorage, MoveOutcome, PlayerPosition, QuestStatus, SaveRecord, SaveStorage,
};

use crate::pilot::{Pilot, RunSummary};
use crate::storage::FileSlotStorage;

/// Shared settings for every scenario run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCtx {
    /// Where the persistence scenario keeps its slot files; in memory if unset
    pub save_dir: Option<PathBuf>,
    pub verbose: bool,
}

pub type ScenarioFn = fn(&ScenarioCtx, u64) -> Result<RunSummary>;

pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    run: ScenarioFn,
}

impl Scenario {
    /// Play the scenario once on `seed`.
    ///
    /// # Errors
    ///
    /// Returns the first expectation the run broke.
    pub fn run(&self, ctx: &ScenarioCtx, seed: u64) -> Result<RunSummary> {
        (self.run)(ctx, seed).with_context(|| format!("{} (seed {seed})", self.name))
    }
}

const CATALOG: &[Scenario] = &[
    Scenario {
        name: "smoke",
        description: "New game, walk to the chest, open it, accept the elder's errand",
        run: smoke,
    },
    Scenario {
        name: "quest-line",
        description: "Play the demo quest chain from the first errand to the shrine",
        run: quest_line,
    },
    Scenario {
        name: "encounters",
        description: "Pace an encounter zone until wild battles fire, then win them",
        run: encounters,
    },
    Scenario {
        name: "persistence",
        description: "Save, mutate, load and compare; then list and delete the slot",
        run: persistence,
    },
];

pub fn find_scenario(name: &str) -> Option<&'static Scenario> {
    CATALOG.iter().find(|scenario| scenario.name == name)
}

pub fn list_scenarios() -> impl Iterator<Item = (&'static str, &'static str)> {
    CATALOG
        .iter()
        .map(|scenario| (scenario.name, scenario.description))
}

fn demo_engine<S: SaveStorage>(storage: S) -> GameEngine<DemoContentLoader, S> {
    GameEngine::new(DemoContentLoader, storage)
}

/// A fresh demo session stepped through the intro and boot screens.
fn explore(ctx: &ScenarioCtx, seed: u64) -> Result<Pilot> {
    let mut game = demo_engine(MemorySlotStorage::new()).new_game(seed)?;
    ensure!(
        game.phase() == GamePhase::IntroCinematic,
        "new game opened in {}",
        game.phase()
    );
    game.finish_intro()?;
    game.finish_boot()?;
    ensure!(
        game.phase() == GamePhase::Exploring,
        "boot ended in {}",
        game.phase()
    );
    Ok(Pilot::new(game, ctx.verbose))
}

/// From the start tile: open the village chest, then take the elder's errand.
fn chest_then_elder(pilot: &mut Pilot) -> Result<()> {
    pilot.walk(1, 0, 2)?;
    pilot.walk(0, -1, 1)?;
    pilot.walk(1, 0, 3)?;
    pilot.walk(0, -1, 1)?;
    ensure!(pilot.at() == (7, 3), "chest approach ended at {:?}", pilot.at());

    let gold = pilot.game().state().inventory.gold;
    let opened = pilot.game_mut().interact();
    ensure!(
        matches!(opened, InteractionOutcome::Treasure { gold: 50, .. }),
        "chest gave {opened:?}"
    );
    ensure!(
        pilot.game().state().inventory.gold == gold + 50,
        "chest gold was not credited"
    );
    let again = pilot.game_mut().interact();
    ensure!(
        matches!(again, InteractionOutcome::AlreadyDone { .. }),
        "chest opened twice: {again:?}"
    );

    pilot.walk(0, 1, 1)?;
    pilot.walk(-1, 0, 3)?;
    pilot.walk(0, -1, 1)?;
    let node = pilot.talk("elder_maren")?;
    ensure!(
        node.as_deref() == Some("elder_intro"),
        "elder opened with {node:?}"
    );
    let accepted = pilot.choose(0)?;
    ensure!(
        accepted
            .report
            .started_quests
            .iter()
            .any(|quest| quest == "moonherb_gathering"),
        "accepting did not start the errand"
    );
    pilot.close_dialogue()?;

    let state = pilot.game().state();
    ensure!(
        state.quests.is_active("moonherb_gathering"),
        "errand not active"
    );
    ensure!(state.flags.is_set("gate_open"), "gate flag not set");
    ensure!(
        pilot.game().phase() == GamePhase::Exploring,
        "dialogue left the game in {}",
        pilot.game().phase()
    );
    Ok(())
}

fn smoke(ctx: &ScenarioCtx, seed: u64) -> Result<RunSummary> {
    let mut pilot = explore(ctx, seed)?;
    ensure!(
        pilot.game().state().party.len() == 1,
        "new party should hold one member"
    );
    chest_then_elder(&mut pilot)?;
    Ok(pilot.summary())
}

fn quest_line(ctx: &ScenarioCtx, seed: u64) -> Result<RunSummary> {
    let mut pilot = explore(ctx, seed)?;
    chest_then_elder(&mut pilot)?;

    // Three moonherbs in the wood.
    pilot.walk(0, 1, 1)?;
    pilot.walk(1, 0, 3)?;
    pilot.teleport(1, 0, "whisperwood")?;
    pilot.walk(1, 0, 3)?;
    pilot.pick(0, -1, "herb_a")?;
    pilot.walk(1, 0, 4)?;
    pilot.pick(0, -1, "herb_c")?;
    pilot.walk(0, 1, 2)?;
    pilot.walk(-1, 0, 1)?;
    pilot.pick(-1, 0, "herb_b")?;
    ensure!(
        pilot
            .game()
            .state()
            .quests
            .is_objective_complete("moonherb_gathering", "gather"),
        "three herbs did not complete the gather objective"
    );

    // Deliver, collect the reward, take the trial.
    pilot.walk(0, -1, 2)?;
    pilot.walk(-1, 0, 6)?;
    pilot.teleport(-1, 0, "ashford")?;
    pilot.walk(-1, 0, 3)?;
    pilot.walk(0, -1, 1)?;
    let node = pilot.talk("elder_maren")?;
    ensure!(
        node.as_deref() == Some("elder_thanks"),
        "elder opened with {node:?}"
    );
    ensure!(
        pilot.game().state().quests.status("moonherb_gathering") == QuestStatus::Completed,
        "errand not completed on delivery"
    );
    let offer = pilot.game_mut().advance_dialogue();
    ensure!(
        offer.node_id.as_deref() == Some("elder_trial_offer"),
        "no trial offer: {:?}",
        offer.node_id
    );
    pilot.choose(0)?;
    pilot.close_dialogue()?;

    // The grove guardian.
    pilot.walk(0, 1, 1)?;
    pilot.walk(1, 0, 3)?;
    pilot.teleport(1, 0, "whisperwood")?;
    pilot.walk(1, 0, 8)?;
    match pilot.step(1, 0)? {
        MoveOutcome::ScriptedBattle { event_id, .. } if event_id == "grove_guardian" => {}
        other => bail!("expected the guardian, got {other:?}"),
    }
    pilot.close_dialogue()?;
    pilot.win_pending_battle()?;
    ensure!(
        pilot.game().state().flags.is_set("guardian_defeated"),
        "guardian victory not recorded"
    );

    // Relight the shrine.
    pilot.walk(0, 1, 1)?;
    pilot.walk(1, 0, 1)?;
    let bump = pilot.game_mut().move_by(0, 1);
    ensure!(
        matches!(bump, MoveOutcome::Blocked { .. }),
        "shrine did not block: {bump:?}"
    );
    let lit = pilot.game_mut().interact();
    ensure!(
        matches!(&lit, InteractionOutcome::Triggered { event_id, .. } if event_id == "forest_shrine"),
        "shrine gave {lit:?}"
    );
    pilot.close_dialogue()?;

    // Report back.
    pilot.walk(0, -1, 1)?;
    pilot.walk(-1, 0, 9)?;
    pilot.teleport(-1, 0, "ashford")?;
    pilot.walk(-1, 0, 3)?;
    pilot.walk(0, -1, 1)?;
    pilot.talk("elder_maren")?;
    pilot.close_dialogue()?;

    let state = pilot.game().state();
    ensure!(
        state.quests.status("guardian_trial") == QuestStatus::Completed,
        "trial not completed"
    );
    ensure!(state.party.contains("lys"), "Lys did not join");
    ensure!(
        state.inventory.quantity("shrine_charm") == 1,
        "shrine charm missing"
    );
    Ok(pilot.summary())
}

const ENCOUNTER_ROUNDS: usize = 3;

fn encounters(ctx: &ScenarioCtx, seed: u64) -> Result<RunSummary> {
    let mut pilot = explore(ctx, seed)?;
    let (min_steps, max_steps) = pilot.game().state().encounters.bounds();
    let zone_roster = ["slime", "wolf"];
    pilot.game_mut().state_mut().position =
        PlayerPosition::new("whisperwood", 4, 3, Direction::Right);

    for round in 1..=ENCOUNTER_ROUNDS {
        let mut fired = None;
        for step in 1..=max_steps {
            let dx = if step % 2 == 1 { 1 } else { -1 };
            if let Some(encounter) = pilot.stroll(dx, 0)? {
                fired = Some((step, encounter));
                break;
            }
        }
        let (step, encounter) =
            fired.with_context(|| format!("round {round}: nothing after {max_steps} steps"))?;
        ensure!(
            step >= min_steps,
            "round {round}: fired after only {step} steps"
        );
        ensure!(
            !encounter.roster.is_empty()
                && encounter
                    .roster
                    .iter()
                    .all(|enemy| zone_roster.contains(&enemy.as_str())),
            "round {round}: roster {:?} is not from the zone",
            encounter.roster
        );
        ensure!(
            pilot.game().state().transition.has_pending_encounter(),
            "round {round}: encounter was not staged"
        );

        let report = pilot.win_pending_battle()?;
        let experience = report.rewards.as_ref().map_or(0, |r| r.experience);
        ensure!(experience > 0, "round {round}: victory paid no experience");
        ensure!(
            pilot.game().phase() == GamePhase::Exploring,
            "round {round}: victory left the game in {}",
            pilot.game().phase()
        );
    }
    Ok(pilot.summary())
}

/// A snapshot with the wall-clock stamp blanked out.
fn comparable(game: &GameSession) -> SaveRecord {
    let mut record = game.snapshot();
    record.timestamp = 0;
    record
}

fn persistence(ctx: &ScenarioCtx, seed: u64) -> Result<RunSummary> {
    match &ctx.save_dir {
        Some(dir) => {
            let storage = FileSlotStorage::new(dir.join(format!("seed-{seed}")));
            log::info!("save slots under {}", storage.root().display());
            round_trip(&demo_engine(storage), ctx, seed)
        }
        None => round_trip(&demo_engine(MemorySlotStorage::new()), ctx, seed),
    }
}

const PERSISTENCE_SLOT: u8 = 1;
const PLAY_TIME_MS: u64 = 45_000;

fn round_trip<S: SaveStorage>(
    engine: &GameEngine<DemoContentLoader, S>,
    ctx: &ScenarioCtx,
    seed: u64,
) -> Result<RunSummary> {
    let mut pilot = Pilot::new(engine.new_game(seed)?, ctx.verbose);
    pilot.game_mut().skip_intro()?;
    chest_then_elder(&mut pilot)?;
    pilot.game_mut().tick(PLAY_TIME_MS);
    let expected = comparable(pilot.game());
    let summary = pilot.summary();

    let slot = engine.save_game(pilot.game_mut(), PERSISTENCE_SLOT)?;
    ensure!(
        slot.play_time_ms == PLAY_TIME_MS,
        "slot records {} ms of play",
        slot.play_time_ms
    );
    if ctx.verbose {
        let saved_at = DateTime::<Utc>::from_timestamp_millis(slot.timestamp)
            .map_or_else(|| slot.timestamp.to_string(), |at| at.to_rfc3339());
        println!(
            "     saved slot {} at {} ({saved_at})",
            slot.slot, slot.location_name
        );
    }

    let state = pilot.game_mut().state_mut();
    state.inventory.gold = 0;
    state.flags.set("tester_mutation");

    let restored = engine
        .load_game(PERSISTENCE_SLOT, seed)?
        .context("slot empty right after saving")?;
    ensure!(
        comparable(&restored) == expected,
        "restored session differs from the saved one"
    );
    ensure!(
        restored.phase() == GamePhase::Exploring,
        "load resumed in {}",
        restored.phase()
    );

    let slots = restored.list_slots(engine.storage())?;
    ensure!(
        slots.len() == 1 && slots[0].slot == PERSISTENCE_SLOT,
        "slot listing was {slots:?}"
    );
    restored.delete_slot(engine.storage(), PERSISTENCE_SLOT)?;
    ensure!(
        engine.load_game(PERSISTENCE_SLOT, seed)?.is_none(),
        "deleted slot still loads"
    );
    Ok(summary)
}
