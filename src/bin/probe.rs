// Diagnostic binary: measure local files and show what loudcast would do

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use loudcast::{
    audio::{AudioProber, FfmpegProber, LoudnessBand, NormalizationStrategy},
    tool::ExternalTool,
};

#[derive(Parser)]
#[command(name = "loudcast-probe", version, about = "Measure audio files and print the normalization decision")]
struct Cli {
    /// Audio files to measure
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Lower edge of the acceptable peak band (dB)
    #[arg(long, default_value_t = -2.5, allow_hyphen_values = true)]
    band_low: f64,

    /// Upper edge of the acceptable peak band (dB)
    #[arg(long, default_value_t = -1.0, allow_hyphen_values = true)]
    band_high: f64,

    #[arg(long, value_enum, default_value_t = NormalizationStrategy::Peak)]
    strategy: NormalizationStrategy,

    /// Also measure integrated loudness
    #[arg(long)]
    integrated: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let prober = FfmpegProber::new(ExternalTool::new(&cli.ffmpeg, Duration::from_secs(900)));
    let band = LoudnessBand::new(cli.band_low, cli.band_high);

    println!("Band: {:.1} dB .. {:.1} dB (target {:.2} dB)", band.low, band.high, band.target());

    for path in &cli.files {
        println!("\n{}", path.display());

        let measurement = match prober.probe(path).await {
            Ok(m) => m,
            Err(e) => {
                println!("   ❌ {}", e);
                continue;
            }
        };

        match measurement.mean_volume_db {
            Some(mean) => println!("   Mean volume: {:.1} dB", mean),
            None => println!("   Mean volume: n/a"),
        }
        match measurement.max_peak_db {
            Some(peak) => {
                println!("   Max volume:  {:.1} dB", peak);
                println!("   Decision:    {}", band.decide(peak, cli.strategy));
            }
            None => println!("   Max volume:  n/a (no decision)"),
        }

        if cli.integrated {
            match prober.probe_integrated(path).await {
                Ok(stats) => println!("   Integrated:  {:.1} LUFS", stats.file_loudness()),
                Err(e) => println!("   Integrated:  ❌ {}", e),
            }
        }
    }

    Ok(())
}
