use std::{path::PathBuf, rc::Rc};

use clap::{Parser, Subcommand};
use log::{error, info};

use ecolap::{
    AppConfig, EcolapError, LapDataProjector, SampleLog, SampleSource, SectorTable,
    TrackIdentifier,
    analysis::AnalysisSession,
    sectors::FileBasedSectorStore,
    telemetry::Odometer,
    writer,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Wheel perimeter in meters, overrides the config file
    #[arg(short, long, global = true)]
    perimeter: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the laps of a sample log with their reconstructed distance
    Laps {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Export the lap table of a time window to CSV
    Export {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long)]
        race: i64,
        #[arg(long)]
        lap: i64,
        /// Window start in seconds
        #[arg(long, default_value_t = 0.)]
        from: f64,
        /// Window end in seconds, defaults to the end of the lap
        #[arg(long)]
        to: Option<f64>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Edit the sectors of a competition
    Sectors {
        #[arg(short, long)]
        competition: Option<String>,
        #[command(subcommand)]
        action: SectorAction,
    },
}

#[derive(Subcommand, Debug)]
enum SectorAction {
    List,
    Add {
        num: u32,
        start: i64,
        end: i64,
    },
    Remove {
        num: u32,
    },
    Update {
        num: u32,
        start: i64,
        end: i64,
    },
    /// Fold a sector into the previous one
    Merge {
        num: u32,
    },
    /// Replace every sector with one spanning a reference lap
    Reset {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long)]
        race: i64,
        #[arg(long)]
        lap: i64,
    },
    /// Minimum and maximum speed of a lap in every sector
    Speeds {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long)]
        race: i64,
        #[arg(long)]
        lap: i64,
    },
    /// Export the sectors with the coordinates of their boundaries
    Export {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn sector_store(config: &AppConfig) -> Result<FileBasedSectorStore, EcolapError> {
    match &config.data_dir {
        Some(dir) => FileBasedSectorStore::new(dir.join("sectors")),
        None => FileBasedSectorStore::new_default(),
    }
}

fn laps(input: &PathBuf, perimeter: f64) -> Result<(), EcolapError> {
    let log = SampleLog::load_jsonl(input)?;
    let odometer = Odometer::new(perimeter)?;
    for track in log.tracks() {
        let samples = log.query_speed(track, None)?;
        let series = odometer.reconstruct(&samples)?;
        println!(
            "{}: {} samples, {:.1} m",
            track,
            samples.len(),
            series.total_distance().unwrap_or_default()
        );
    }
    Ok(())
}

fn export(
    input: &PathBuf,
    track: TrackIdentifier,
    from: f64,
    to: Option<f64>,
    output: &PathBuf,
    perimeter: f64,
) -> Result<(), EcolapError> {
    let log = SampleLog::load_jsonl(input)?;
    let to = match to {
        Some(to) => to,
        None => log
            .query_speed(track, None)?
            .last()
            .map(|s| s.time_s())
            .unwrap_or_default(),
    };
    let rows = LapDataProjector::new(&log, perimeter)?.project(track, from, to)?;
    writer::write_lap_rows(output, &rows)
}

fn sectors(
    config: &AppConfig,
    competition: Option<&str>,
    perimeter: Option<f64>,
    action: &SectorAction,
) -> Result<(), EcolapError> {
    let competition = config.competition(competition, perimeter)?;
    let store = sector_store(config)?;
    let name = competition.name.as_str();

    match action {
        SectorAction::Reset { input, race, lap } => {
            let log = SampleLog::load_jsonl(input)?;
            let mut session = AnalysisSession::new(Rc::new(log), store, competition.clone())?;
            session.delimit_sectors(TrackIdentifier::new(*race, *lap))?;
            print_sectors(name, session.sectors());
            return Ok(());
        }
        SectorAction::Speeds { input, race, lap } => {
            let log = SampleLog::load_jsonl(input)?;
            let session = AnalysisSession::new(Rc::new(log), store, competition.clone())?;
            let track = TrackIdentifier::new(*race, *lap);
            for stats in session.sector_speeds(track)? {
                match (stats.window, stats.min_kmh, stats.max_kmh) {
                    (Some((entry, exit)), Some(min), Some(max)) => println!(
                        "  {:>3}  {:.1}..{:.1} s  Vmin {:.1} km/h  Vmax {:.1} km/h",
                        stats.num, entry, exit, min, max
                    ),
                    _ => println!("  {:>3}  not crossed on {}", stats.num, track),
                }
            }
            return Ok(());
        }
        SectorAction::Export { input, output } => {
            let log = SampleLog::load_jsonl(input)?;
            let mut table = SectorTable::new(store);
            let sectors = table.list(name)?;
            return writer::write_sector_config(output, sectors, &log);
        }
        _ => {}
    }

    let mut table = SectorTable::new(store);
    match action {
        SectorAction::Add { num, start, end } => table.insert(name, *num, *start, *end)?,
        SectorAction::Remove { num } => table.remove(name, *num)?,
        SectorAction::Update { num, start, end } => {
            table.update_boundaries(name, *num, *start, *end)?
        }
        SectorAction::Merge { num } => table.merge(name, *num)?,
        _ => {}
    }
    let sectors = table.list(name)?;
    print_sectors(name, sectors);
    Ok(())
}

fn print_sectors(competition: &str, sectors: &[ecolap::Sector]) {
    println!("{} sectors for {}", sectors.len(), competition);
    for sector in sectors {
        println!(
            "  {:>3}  {}..={}",
            sector.num, sector.start_pos, sector.end_pos
        );
    }
}

fn run(cli: &Args) -> Result<(), EcolapError> {
    let config = AppConfig::from_local_file().unwrap_or_default();
    let perimeter = cli.perimeter.unwrap_or(config.wheel_perimeter_m);
    info!("Using a wheel perimeter of {} m", perimeter);

    match &cli.command {
        Commands::Laps { input } => laps(input, perimeter),
        Commands::Export {
            input,
            race,
            lap,
            from,
            to,
            output,
        } => export(
            input,
            TrackIdentifier::new(*race, *lap),
            *from,
            *to,
            output,
            perimeter,
        ),
        Commands::Sectors {
            competition,
            action,
        } => sectors(&config, competition.as_deref(), cli.perimeter, action),
    }
}

fn main() {
    colog::init();

    let cli = Args::parse();
    if let Err(e) = run(&cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
