//! Auto-evo CLI - Evolve a patch map for one generation from a JSON world file.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use auto_evo::{compute::autoevo::AutoEvoRun, schema::WorldFile};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--example" {
        print_example_world();
        return;
    }

    if args.len() < 2 {
        eprintln!("Usage: {} <world.json> [ticks-per-report]", args[0]);
        eprintln!();
        eprintln!("Run one auto-evo generation over a world file.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  world.json        Patch map, configuration and optional tables");
        eprintln!("  ticks-per-report  Ticks between progress lines (default: 1)");
        eprintln!();
        eprintln!("Example world is generated with --example flag.");
        std::process::exit(1);
    }

    let world_path = PathBuf::from(&args[1]);
    let ticks_per_report: usize = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1)
        .max(1);

    let world_str = fs::read_to_string(&world_path).unwrap_or_else(|e| {
        eprintln!("Error reading world file: {}", e);
        std::process::exit(1);
    });

    let world: WorldFile = serde_json::from_str(&world_str).unwrap_or_else(|e| {
        eprintln!("Error parsing world: {}", e);
        std::process::exit(1);
    });

    println!("Auto-evo");
    println!("========");
    println!("Patches: {}", world.map.patches.len());
    println!("Species: {}", world.map.species.len());
    println!(
        "Mutation points: {}",
        world.config.effective_mutation_points()
    );
    println!();

    let mut map = world.map;
    let params = world.params.unwrap_or_default();
    let mut run = AutoEvoRun::new(&map, world.config, params).unwrap_or_else(|e| {
        eprintln!("Error setting up run: {}", e);
        std::process::exit(1);
    });
    println!("Seed: {}", run.seed());
    println!("Total steps: {}", run.total_steps());
    println!();

    println!("Running auto-evo...");
    let start = Instant::now();
    let mut ticks = 0;
    loop {
        let more = run.tick().unwrap_or_else(|e| {
            eprintln!("Error during run: {}", e);
            std::process::exit(1);
        });
        ticks += 1;

        if ticks % ticks_per_report == 0 || !more {
            println!(
                "  Tick {}: {}/{} steps ({:.0}%)",
                ticks,
                run.completed_steps(),
                run.total_steps(),
                run.progress() * 100.0
            );
        }
        if !more {
            break;
        }
    }
    let elapsed = start.elapsed();

    let results = match run.results() {
        Ok(results) => results.clone(),
        Err(e) => {
            eprintln!("Error collecting results: {}", e);
            std::process::exit(1);
        }
    };

    let names: BTreeMap<_, _> = map
        .species
        .iter()
        .map(|(id, species)| (*id, species.formatted_name()))
        .collect();
    println!();
    print!("{}", results.summary(&names));

    if let Err(e) = results.apply_to(&mut map) {
        eprintln!("Error applying results: {}", e);
        std::process::exit(1);
    }

    let results_path = world_path.with_extension("results.json");
    let output = serde_json::json!({
        "results": results,
        "map": map,
    });
    let json = serde_json::to_string_pretty(&output).unwrap_or_else(|e| {
        eprintln!("Error serializing results: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = fs::write(&results_path, json) {
        eprintln!("Error writing results: {}", e);
        std::process::exit(1);
    }

    println!();
    println!("New species: {}", results.new_species().count());
    println!("Results written to {}", results_path.display());
    println!("Time: {:.2}s ({} ticks)", elapsed.as_secs_f32(), ticks);
}

fn print_example_world() {
    let world = WorldFile::example();

    println!("Example world (world.json):");
    match serde_json::to_string_pretty(&world) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example: {}", e),
    }
}
