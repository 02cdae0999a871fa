use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use statement_pdf::units::{Orientation, PageFormat, Unit};
use statement_pdf::{CancellationToken, FontChoice, Options, Pipeline, load_blocks};

#[derive(Parser)]
#[command(
    name = "statement-pdf",
    version,
    about = "Paginate extracted definitions and theorems into a PDF without splitting any block"
)]
struct Cli {
    /// Extraction output: a JSON array of blocks or {"content": [...]}
    input: PathBuf,

    /// Output PDF path (default: input with .pdf extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON options file; flags below override it
    #[arg(long)]
    options: Option<PathBuf>,

    /// Page format: a3, a4, a5, letter, legal
    #[arg(long)]
    format: Option<String>,

    #[arg(long)]
    landscape: bool,

    /// Page unit: pt, mm, cm, in, px
    #[arg(long)]
    unit: Option<String>,

    /// Page margin in the page unit
    #[arg(long)]
    margin: Option<f64>,

    /// Raster density (captured pixels per layout pixel)
    #[arg(long)]
    scale: Option<f32>,

    /// Layout width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Vertical gap between blocks in layout pixels
    #[arg(long)]
    gap: Option<u32>,

    /// Font file to render with, or "builtin"
    #[arg(long)]
    font: Option<String>,

    /// Also write the full rendered surface as PNG
    #[arg(long)]
    dump_surface: Option<PathBuf>,
}

fn build_options(cli: &Cli) -> Result<Options, String> {
    let mut options = match &cli.options {
        Some(path) => Options::from_json_file(path).map_err(|e| format!("{}: {e}", path.display()))?,
        None => Options::default(),
    };
    if let Some(f) = &cli.format {
        options.page.format = PageFormat::parse(f).ok_or_else(|| format!("unknown page format '{f}'"))?;
    }
    if cli.landscape {
        options.page.orientation = Orientation::Landscape;
    }
    if let Some(u) = &cli.unit {
        options.page.unit = Unit::parse(u).ok_or_else(|| format!("unknown unit '{u}'"))?;
    }
    if let Some(m) = cli.margin {
        options.page.margin = m;
    }
    if let Some(s) = cli.scale {
        options.raster_scale = s;
    }
    if let Some(w) = cli.width {
        options.layout_width = w;
    }
    if let Some(g) = cli.gap {
        options.block_gap = g;
    }
    if let Some(font) = &cli.font {
        options.font = if font.eq_ignore_ascii_case("builtin") {
            FontChoice::Builtin
        } else {
            FontChoice::Path(PathBuf::from(font))
        };
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let options = match build_options(&cli) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("pdf"));

    let blocks = match std::fs::read_to_string(&cli.input)
        .map_err(statement_pdf::Error::from)
        .and_then(|json| load_blocks(&json))
    {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };

    let pipeline = Pipeline::new(options);
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = async {
        let surface = pipeline.render(&blocks, &cancel).await?;
        if let Some(path) = &cli.dump_surface {
            surface.image.save(path)?;
            log::info!("Wrote surface to {}", path.display());
        }
        let doc = pipeline.paginate(&surface, &cancel).await?;
        std::fs::write(&output, &doc.pdf)?;
        Ok::<_, statement_pdf::Error>(doc)
    }
    .await;

    match result {
        Ok(doc) => {
            for clip in doc.clipped() {
                eprintln!(
                    "Warning: block {} does not fit on one page; {}px were cut off",
                    clip.block + 1,
                    clip.lost_px
                );
            }
            println!(
                "{} blocks -> {} pages: {}",
                doc.blocks.len(),
                doc.page_count(),
                output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
