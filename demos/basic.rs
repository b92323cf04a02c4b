//! Basic example of driving the 2048 engine

use game2048_core::{decode, encode, Direction, GameState, Position};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() {
    let mut rng = StdRng::seed_from_u64(2048);

    // Start a game
    let (mut state, spawned) = GameState::setup(4, &mut rng);
    println!("New game, spawned {:?}\n", spawned);
    println!("{}", state.grid);

    // Play a few moves, always following the hint
    for _ in 0..8 {
        let Some(dir) = state.hint() else {
            println!("No moves left");
            break;
        };
        let (next, result) = state.step(dir, &mut rng);
        println!(
            "{} -> score {}, merges at {:?}",
            dir, result.score, result.merged_cells
        );
        state = next;
    }
    println!("\n{}", state.grid);

    // Undo the last move
    if state.can_undo() {
        state = state.undo();
        println!("After undo (score {}):\n{}", state.score, state.grid);
    }

    // Shuffle and swap
    if let Some(shuffled) = state.shuffle(&mut rng) {
        state = shuffled;
        println!("Shuffled:\n{}", state.grid);
    }
    let occupied = state.grid.occupied();
    if let [a, b, ..] = occupied.as_slice() {
        match state.swap_tiles(*a, *b) {
            Ok((next, _)) => state = next,
            Err(e) => println!("swap rejected: {}", e.code()),
        }
    }
    if let Err(e) = state.swap_tiles(Position::new(0, 0), Position::new(0, 0)) {
        println!("Self-swap rejected: {}", e);
    }

    // Round-trip through the session codec
    match encode(&state).and_then(|blob| decode(&blob)) {
        Ok(restored) => println!("Restored {} moves, score {}", restored.moves, restored.score),
        Err(e) => println!("Codec error: {}", e),
    }

    match "sideways".parse::<Direction>() {
        Ok(dir) => println!("parsed {}", dir),
        Err(e) => println!("{}", e),
    }
}
