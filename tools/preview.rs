/// Preview — interactive shell for walking through a ritual session.
///
/// Usage: preview [--theme <dir>] [--seed <n>]
///
/// Commands:
///   start        — open a new session
///   round        — show the current prompt and its laid-out images
///   pick <a|b>   — choose the first or second image of the round
///   auto         — play the remaining rounds with random picks
///   collage      — print the closing grid collage
///   decor        — print the rotated scatter of chosen images
///   poem         — compose (or recall) the session's poem
///   seed <n>     — rebuild the ritual with a new seed
///   help         — list commands
///   quit         — exit
///
/// Set RUST_LOG=reverie_engine=debug to watch layout and composition.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reverie_engine::catalog;
use reverie_engine::core::ritual::{Ritual, RitualError};
use reverie_engine::core::session::SessionId;
use reverie_engine::schema::placement::Placement;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut theme_dir = None;
    let mut seed: u64 = 42;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                return;
            }
            "--theme" if i + 1 < args.len() => {
                i += 1;
                theme_dir = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut ritual = match build_ritual(theme_dir.as_deref(), seed) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Loaded {} prompts, {} rounds per session",
        ritual.pool().len(),
        ritual.config().rounds
    );
    println!("Theme: {}", theme_dir.as_deref().unwrap_or(catalog::DEFAULT_THEME));
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    let mut session: Option<SessionId> = None;
    let mut picker = StdRng::seed_from_u64(seed);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        if matches!(cmd.as_str(), "quit" | "exit" | "q") {
            println!("Goodbye.");
            break;
        }

        let result = match cmd.as_str() {
            "help" | "h" | "?" => {
                print_help();
                Ok(())
            }
            "start" => ritual.start_session().map(|id| {
                println!("Session {} started.", id);
                session = Some(id);
            }),
            "seed" => {
                match parts.get(1).and_then(|s| s.parse::<u64>().ok()) {
                    Some(n) => match build_ritual(theme_dir.as_deref(), n) {
                        Ok(r) => {
                            ritual = r;
                            picker = StdRng::seed_from_u64(n);
                            session = None;
                            println!("Seed set to {}. Start a new session.", n);
                        }
                        Err(e) => println!("ERROR: {}", e),
                    },
                    None => println!("Usage: seed <n>"),
                }
                Ok(())
            }
            other => match session {
                None => {
                    println!("No session. Type 'start' first.");
                    Ok(())
                }
                Some(id) => run_session_command(&ritual, id, other, &parts, &mut picker),
            },
        };

        if let Err(e) = result {
            println!("ERROR: {}", e);
        }
    }
}

fn build_ritual(theme_dir: Option<&str>, seed: u64) -> Result<Ritual, RitualError> {
    let builder = Ritual::builder().seed(seed);
    match theme_dir {
        Some(dir) => builder.theme_dir(dir).build(),
        None => builder.build(),
    }
}

fn run_session_command(
    ritual: &Ritual,
    id: SessionId,
    cmd: &str,
    parts: &[&str],
    picker: &mut StdRng,
) -> Result<(), RitualError> {
    match cmd {
        "round" | "r" => match ritual.current_round(id)? {
            Some(round) => {
                println!(
                    "\nRound {}/{}: \"{}\"",
                    round.index + 1,
                    round.total,
                    round.prompt.text
                );
                for (label, placement) in ["a", "b"].iter().zip(&round.placements) {
                    println!("  [{}] {}", label, describe(placement));
                }
                println!();
            }
            None => println!("Session complete. Try 'collage' or 'poem'."),
        },
        "pick" | "p" => {
            let Some(round) = ritual.current_round(id)? else {
                println!("Session complete.");
                return Ok(());
            };
            let image = match parts.get(1).copied() {
                Some("a") => &round.pairing.image_a,
                Some("b") => &round.pairing.image_b,
                _ => {
                    println!("Usage: pick <a|b>");
                    return Ok(());
                }
            };
            let phase = ritual.choose(id, image)?;
            println!("Chose {} ({:?})", image, phase);
        }
        "auto" => {
            let mut picked = 0;
            while let Some(round) = ritual.current_round(id)? {
                let image = if picker.gen_bool(0.5) {
                    &round.pairing.image_a
                } else {
                    &round.pairing.image_b
                };
                ritual.choose(id, image)?;
                picked += 1;
            }
            println!("Played {} rounds.", picked);
        }
        "collage" => {
            println!("\n--- Collage ---");
            for placement in ritual.collage(id)? {
                println!("  {}", describe(&placement));
            }
            println!("--- End ---\n");
        }
        "decor" => {
            println!("\n--- Decor ---");
            for placement in ritual.scatter_decor(id)? {
                println!("  {}", describe(&placement));
            }
            println!("--- End ---\n");
        }
        "poem" => {
            let poem = ritual.poem(id)?;
            println!("\n--- Poem ---");
            println!("{}", poem.to_text());
            println!("--- End ---\n");
        }
        _ => println!("Unknown command: {}. Type 'help' for commands.", cmd),
    }
    Ok(())
}

fn describe(p: &Placement) -> String {
    format!(
        "{:<24} at ({:>7.1}, {:>6.1})  {:>5.1} x {:<5.1}  rot {:+.1}°",
        p.image_id.as_str(),
        p.x,
        p.y,
        p.width,
        p.height,
        p.rotation_degrees
    )
}

fn print_usage() {
    println!("Usage: preview [--theme <dir>] [--seed <n>]");
}

fn print_help() {
    println!("Commands:");
    println!("  start        — open a new session");
    println!("  round        — show the current prompt and its laid-out images");
    println!("  pick <a|b>   — choose the first or second image of the round");
    println!("  auto         — play the remaining rounds with random picks");
    println!("  collage      — print the closing grid collage");
    println!("  decor        — print the rotated scatter of chosen images");
    println!("  poem         — compose (or recall) the session's poem");
    println!("  seed <n>     — rebuild the ritual with a new seed");
    println!("  help         — list commands");
    println!("  quit         — exit");
}
