//! location-segments CLI - run the segmentation pipeline over OCED JSON files
//!
//! Usage:
//!   location-segments segment <input> --config <file> --user <id>
//!                             [--sensor-type <type>] [--output <file>]
//!   location-segments enrich <input> --event-type <type>
//!                            [--object-type <type>] [--output <file>]
//!
//! `segment` extracts location samples from the graph's sensor events, writes
//! the resulting location events and segment objects back into the graph and
//! prints a per-day summary. `enrich` relates other events/objects of an
//! already segmented graph to its location segments.

use clap::{Parser, Subcommand};
use location_segments::{
    add_location_attribute, emit_segments, relate_events_to_locations,
    relate_objects_to_locations, samples_from_sensor_events, GraphDayFactory, LocationSegmenter,
    OcedGraph, Result, SegmentationConfig, UuidGenerator, LOCATION_SENSOR_TYPE,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "location-segments")]
#[command(about = "Segment GPS sensor events into labeled location segments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment one user's location samples and emit events/objects
    Segment {
        /// OCED graph JSON file
        input: PathBuf,

        /// Segmentation config JSON file (geofences and thresholds)
        #[arg(short, long)]
        config: PathBuf,

        /// Id of the user object the segments belong to
        #[arg(short, long)]
        user: String,

        /// sensorEventType of the GPS readings
        #[arg(short, long, default_value = LOCATION_SENSOR_TYPE)]
        sensor_type: String,

        /// Where to write the updated graph (defaults to the input file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Relate events and objects to existing location segments
    Enrich {
        /// OCED graph JSON file
        input: PathBuf,

        /// Behavior event type to relate by timestamp containment
        #[arg(short, long)]
        event_type: String,

        /// Object type related through the events' starts/ends edges
        #[arg(long)]
        object_type: Option<String>,

        /// Where to write the updated graph (defaults to the input file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let outcome = match cli.command {
        Commands::Segment {
            input,
            config,
            user,
            sensor_type,
            output,
        } => run_segment(
            &input,
            &config,
            &user,
            &sensor_type,
            output.as_deref().unwrap_or(&input),
        ),
        Commands::Enrich {
            input,
            event_type,
            object_type,
            output,
        } => run_enrich(
            &input,
            &event_type,
            object_type.as_deref(),
            output.as_deref().unwrap_or(&input),
        ),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_segment(
    input: &Path,
    config: &Path,
    user: &str,
    sensor_type: &str,
    output: &Path,
) -> Result<()> {
    let segmenter = LocationSegmenter::new(SegmentationConfig::from_json_file(config)?)?;
    let mut graph = OcedGraph::from_json_file(input)?;

    let samples = samples_from_sensor_events(graph.sensor_events_of_type(Some(sensor_type)));
    println!("\n{}", "=".repeat(60));
    println!("Segmenting {} samples for user {}", samples.len(), user);
    println!("{}", "=".repeat(60));

    let result = segmenter.segment(&samples);
    for (date, periods) in &result.active_periods {
        println!("\n  {} ({} active periods)", date, periods.len());
        for segment in result.segments_on(*date) {
            println!(
                "    {} - {}  {:<12} {:>5} min",
                segment.start.format("%H:%M:%S"),
                segment.end.format("%H:%M:%S"),
                segment.label,
                segment.duration().num_minutes()
            );
        }
    }

    let mut days = GraphDayFactory::new(UuidGenerator);
    let summary =
        emit_segments(&mut graph, &result.segments, user, &mut days, &mut UuidGenerator);

    println!("\n{}", "-".repeat(60));
    println!(
        "Segments: {} final ({} gaps), {} dropped as too short",
        result.segments.len(),
        result.stats.gap_segments,
        result.stats.dropped_segments
    );
    println!(
        "Emitted {} events, skipped {} segments",
        summary.events.len(),
        summary.skipped
    );

    graph.write_json_file(output)?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn run_enrich(
    input: &Path,
    event_type: &str,
    object_type: Option<&str>,
    output: &Path,
) -> Result<()> {
    let mut graph = OcedGraph::from_json_file(input)?;

    let events = relate_events_to_locations(&mut graph, event_type);
    let attributes = add_location_attribute(&mut graph, event_type);
    println!("Related {} {} events, labeled {}", events, event_type, attributes);

    if let Some(object_type) = object_type {
        let objects = relate_objects_to_locations(&mut graph, object_type, event_type);
        println!("Related {} {} objects", objects, object_type);
    }

    graph.write_json_file(output)?;
    println!("Wrote {}", output.display());
    Ok(())
}
