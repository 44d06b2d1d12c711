use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use tiledrop_core::{
    Action, Board, GridConfig, NEXT_TILE_KEY, NextTilePicker, StateStore, StorageBackend, Tile,
    TileValue,
};

#[derive(Parser, Debug)]
#[command(version, about = "Column-drop merge puzzle in the terminal")]
struct Args {
    /// What log level to use
    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity,

    /// Board rows
    #[arg(long, default_value_t = 5)]
    rows: usize,

    /// Board columns
    #[arg(long, default_value_t = 4)]
    cols: usize,

    /// Force a seed instead of a random one
    #[arg(short, long)]
    seed: Option<u64>,

    /// Save file; the game resumes from it and persists every move
    #[arg(long)]
    save: Option<PathBuf>,
}

/// Whole-store JSON snapshot in a plain file, the native counterpart of
/// the browser's local storage.
struct FileBackend {
    path: PathBuf,
}

impl StorageBackend for FileBackend {
    fn load(&mut self) -> Option<String> {
        fs::read_to_string(&self.path).ok()
    }

    fn save(&mut self, snapshot: &str) {
        if let Err(err) = fs::write(&self.path, snapshot) {
            log::error!("failed to write save file {}: {err}", self.path.display());
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let store = match &args.save {
        Some(path) => StateStore::with_backend(Box::new(FileBackend { path: path.clone() })),
        None => StateStore::new(),
    };

    let config = GridConfig::new(args.rows, args.cols);
    let mut board = Board::with_store(config, store.clone())
        .context("saved board does not fit the requested size")?;

    let seed = args.seed.unwrap_or_else(random_seed);
    log::debug!("seed: {seed}");
    let _next_tile = NextTilePicker::attach(&store, seed);

    print_board(&board);
    let stdin = io::stdin();
    loop {
        let pending = pending_tile(&store);
        print!(
            "drop {} into column 0-{}, r to reset, q to quit> ",
            pending,
            board.cols() - 1
        );
        io::stdout().flush()?;

        let Some(line) = stdin.lock().lines().next() else {
            break;
        };
        let line = line?;
        match line.trim() {
            "" => continue,
            "q" | "quit" => break,
            "r" | "reset" => {
                board.reset();
                print_board(&board);
            }
            input => match input.parse::<i32>() {
                Err(_) => println!("unrecognized input: {input}"),
                Ok(col) => {
                    match board.insert((0, col), pending) {
                        Ok(log) if log.is_empty() => println!("column is full, tile absorbed"),
                        Ok(log) => play_back(&log),
                        Err(err) => println!("invalid drop: {err}"),
                    }
                    print_board(&board);
                }
            },
        }
    }

    Ok(())
}

fn random_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}

fn pending_tile(store: &StateStore) -> TileValue {
    store
        .get(NEXT_TILE_KEY)
        .and_then(|value| value.as_i64())
        .unwrap_or(2)
}

/// Narrates the action log in emitted order; this is the renderer seam,
/// so the match is deliberately exhaustive.
fn play_back(log: &[Action]) {
    for action in log {
        match *action {
            Action::Add { to, value } => println!("  + {value} lands at {to:?}"),
            Action::Move { from, to } => println!("  ~ tile slides {from:?} -> {to:?}"),
            Action::Merge { from, to, value } if from == to => {
                println!("  * incoming tile merges at {to:?} into {value}")
            }
            Action::Merge { from, to, value } => {
                println!("  * {from:?} merges into {to:?} making {value}")
            }
        }
    }
}

fn print_board(board: &Board) {
    print!("   ");
    for col in 0..board.cols() {
        print!("{col:^7}");
    }
    println!();
    for (row, tiles) in board.tiles().rows().into_iter().enumerate() {
        print!("{row:>2} ");
        for tile in tiles {
            print!("{}", paint(*tile));
        }
        println!();
    }
}

fn paint(tile: Tile) -> String {
    let style = tile.style();
    let (br, bg, bb) = rgb(style.bg);
    let (tr, tg, tb) = rgb(style.text);
    format!(
        "\x1b[48;2;{br};{bg};{bb}m\x1b[38;2;{tr};{tg};{tb}m{:^7}\x1b[0m",
        style.label
    )
}

/// Parses `#rgb` or `#rrggbb`; anything else renders as black.
fn rgb(hex: &str) -> (u8, u8, u8) {
    let hex = hex.trim_start_matches('#');
    let channel = |part: &str| u8::from_str_radix(part, 16).unwrap_or(0);
    match hex.len() {
        3 => {
            let doubled: Vec<u8> = hex
                .chars()
                .map(|c| channel(&format!("{c}{c}")))
                .collect();
            (doubled[0], doubled[1], doubled[2])
        }
        6 => (
            channel(&hex[0..2]),
            channel(&hex[2..4]),
            channel(&hex[4..6]),
        ),
        _ => (0, 0, 0),
    }
}
