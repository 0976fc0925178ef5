//! Chart converter CLI

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info};
use maichart::config::{ConvertOptions, RawOffset, RawOptions};
use maichart::convert;
use maichart::dsl::{parse_document, ParserSession};
use maichart::formats::sdt::{self, SdtOptions};
use maichart::formats::Format;
use maichart::{offset_chart, quantise_chart, render_dsl, Chart, Epoch};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "maichart")]
#[command(about = "Convert maimai charts between the DSL, ma2 and sdt formats", long_about = None)]
struct Cli {
    /// Chart to read
    input: PathBuf,

    /// Where to write the converted chart (default: stdout)
    output: Option<PathBuf>,

    /// Input format (default: from the input extension)
    #[arg(long)]
    from: Option<Format>,

    /// Output format (default: from the output extension, or dsl)
    #[arg(long)]
    to: Option<Format>,

    /// Tempo of sdt input, and the fixed tempo of sdt output
    #[arg(long)]
    bpm: Option<f64>,

    /// Shift the chart by measures ("0.25", "1/4") or seconds ("1.5s")
    #[arg(long, allow_hyphen_values = true)]
    offset: Option<String>,

    /// Snap positions to this many divisions per measure
    #[arg(long)]
    quantise: Option<u32>,

    /// Largest denominator the DSL writer may use
    #[arg(long = "max-den")]
    max_denominator: Option<u32>,

    /// Ticks per measure for ma2 output
    #[arg(long)]
    resolution: Option<u32>,

    /// Map touch notes onto lanes in sdt output
    #[arg(long)]
    convert_touch: bool,

    /// DSL parser worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Difficulty to take from a DSL document (default: the highest)
    #[arg(long)]
    chart: Option<u32>,

    /// YAML options file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the parsed chart as JSON instead of converting it
    #[arg(long)]
    dump_json: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> Result<ConvertOptions> {
        let base = match &self.config {
            Some(path) => ConvertOptions::load(path)?,
            None => ConvertOptions::default(),
        };
        let flags = RawOptions {
            max_denominator: self.max_denominator,
            resolution: self.resolution,
            offset: self.offset.clone().map(RawOffset::Text),
            quantise: self.quantise,
            fixed_bpm: self.bpm,
            convert_touch: self.convert_touch.then_some(true),
            workers: self.workers,
        };
        Ok(base.merge(flags)?)
    }
}

fn read_dsl(text: &str, options: &ConvertOptions, difficulty: Option<u32>) -> Result<Chart> {
    if !text.trim_start().starts_with('&') {
        return Ok(ParserSession::new(options.workers)?.parse(text)?);
    }

    let mut document = parse_document(text, options.workers)?;
    info!("read document \"{}\" with {} charts", document.title, document.charts.len());
    let selected = match difficulty {
        Some(number) => number,
        None => match document.charts.keys().next_back() {
            Some(number) => *number,
            None => bail!("document has no charts"),
        },
    };
    match document.charts.remove(&selected) {
        Some(chart) => Ok(chart),
        None => bail!("document has no chart {}", selected),
    }
}

fn read_chart(cli: &Cli, format: Format, options: &ConvertOptions) -> Result<Chart> {
    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("Error reading file '{}'", cli.input.display()))?;

    let chart = match format {
        Format::Dsl => read_dsl(&text, options, cli.chart)?,
        Format::Ma2 => maichart::parse_ticks(text.lines())?,
        Format::Sdt => {
            let Some(bpm) = options.fixed_bpm else {
                bail!("sdt input has no tempo of its own; pass --bpm");
            };
            sdt::parse_records(text.lines(), bpm)?
        }
    };
    Ok(chart)
}

fn write_chart(chart: &Chart, format: Format, options: &ConvertOptions) -> Result<String> {
    let text = match format {
        Format::Dsl => {
            let chart = convert::rebase(chart, Epoch::One)?;
            let mut text = render_dsl(&chart, options.max_denominator)?;
            text.push('\n');
            text
        }
        Format::Ma2 => {
            let lines = maichart::render_ticks(chart, options.resolution)?;
            lines.join("\n") + "\n"
        }
        Format::Sdt => {
            let fixed = convert::to_fixed_tempo(chart, options.fixed_bpm)?;
            let sdt_options = SdtOptions {
                convert_touch: options.convert_touch,
            };
            let lines = sdt::render_records(&fixed, sdt_options)?;
            lines.join("\n") + "\n"
        }
    };
    Ok(text)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let options = cli.options()?;
    debug!("{:?}", options);

    let Some(from) = cli.from.or_else(|| Format::from_path(&cli.input)) else {
        bail!("Cannot tell the format of '{}'; pass --from", cli.input.display());
    };
    let to = cli
        .to
        .or_else(|| cli.output.as_deref().and_then(Format::from_path))
        .unwrap_or(Format::Dsl);

    let mut chart = read_chart(&cli, from, &options)?;
    info!("read {} notes from {}", chart.notes().len(), cli.input.display());

    if let Some(offset) = options.offset {
        chart = offset_chart(&chart, offset)?;
    }
    if let Some(grid) = options.quantise {
        chart = quantise_chart(&chart, grid)?;
    }

    let text = if cli.dump_json {
        serde_json::to_string_pretty(&chart)? + "\n"
    } else {
        write_chart(&chart, to, &options)
            .with_context(|| format!("Error converting {} to {}", from, to))?
    };

    match &cli.output {
        Some(path) => {
            fs::write(path, &text)
                .with_context(|| format!("Error writing to '{}'", path.display()))?;
            info!("Wrote {} chart to {}", to, path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}
