//! jpegls CLI - encode, decode and inspect JPEG-LS files with the native
//! CharLS library.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use jpegls_native::{
    CharlsLibrary, ColorTransformation, EncodeOptions, FrameInfo, InterleaveMode, JpeglsDecoder,
    SpiffColorSpace, decode_to_vec, encode_to_vec,
};
use tracing::Level;

/// JPEG-LS codec front end for the native CharLS library
#[derive(Parser)]
#[command(name = "jpegls")]
#[command(version)]
#[command(about = "Encode, decode and inspect JPEG-LS images", long_about = None)]
#[command(after_help = "EXAMPLES:
    jpegls info -i image.jls
    jpegls decode -i image.jls -o image.pgm -f pnm
    jpegls encode -i pixels.raw -o image.jls -w 512 -H 512 -n 3 --interleave sample")]
struct Cli {
    /// Path of the native CharLS library
    #[arg(long, global = true, env = "CHARLS_LIBRARY_PATH")]
    library: Option<PathBuf>,

    /// Log native handle and buffer activity
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the version of the native library
    Version,

    /// Display the SPIFF header, frame info and coding parameters of a file
    #[command(visible_alias = "i")]
    Info {
        #[arg(short, long, help = "Path to the JPEG-LS file to inspect")]
        input: PathBuf,
    },

    /// Encode raw pixels to JPEG-LS
    ///
    /// Samples wider than 8 bits are read as 16-bit little-endian values.
    #[command(visible_alias = "e")]
    Encode {
        #[arg(short, long, help = "Path to raw pixel data file")]
        input: PathBuf,

        #[arg(short, long, help = "Path for the encoded output file")]
        output: PathBuf,

        /// Image width in pixels
        #[arg(short, long)]
        width: u32,

        /// Image height in pixels
        #[arg(short = 'H', long)]
        height: u32,

        /// Number of color components (1=grayscale, 3=RGB)
        #[arg(short = 'n', long, default_value = "1")]
        components: i32,

        /// Bits per sample (2-16)
        #[arg(short, long, default_value = "8")]
        bits_per_sample: i32,

        /// Maximum error per sample (0=lossless)
        #[arg(long, default_value = "0")]
        near_lossless: i32,

        #[arg(long, default_value = "none", value_enum)]
        interleave: Interleave,

        /// Apply an HP color transformation to RGB input
        #[arg(long, default_value = "none", value_enum)]
        color_transformation: Transformation,

        /// Write a standard SPIFF header
        #[arg(long)]
        spiff: bool,

        /// Store a COM segment with this text
        #[arg(long)]
        comment: Option<String>,
    },

    /// Decode a JPEG-LS file to raw pixels or PGM/PPM
    #[command(visible_alias = "d")]
    Decode {
        #[arg(short, long, help = "Path to the JPEG-LS file")]
        input: PathBuf,

        #[arg(short, long, help = "Path for the decoded output")]
        output: PathBuf,

        #[arg(short, long, default_value = "raw", value_enum)]
        format: OutputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Raw binary pixel data
    Raw,
    /// Portable GrayMap / PixMap (PGM/PPM)
    Pnm,
}

#[derive(Clone, Copy, ValueEnum)]
enum Interleave {
    None,
    Line,
    Sample,
}

impl From<Interleave> for InterleaveMode {
    fn from(value: Interleave) -> Self {
        match value {
            Interleave::None => InterleaveMode::None,
            Interleave::Line => InterleaveMode::Line,
            Interleave::Sample => InterleaveMode::Sample,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Transformation {
    None,
    Hp1,
    Hp2,
    Hp3,
}

impl From<Transformation> for ColorTransformation {
    fn from(value: Transformation) -> Self {
        match value {
            Transformation::None => ColorTransformation::None,
            Transformation::Hp1 => ColorTransformation::Hp1,
            Transformation::Hp2 => ColorTransformation::Hp2,
            Transformation::Hp3 => ColorTransformation::Hp3,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let result = load_library(cli.library.as_deref()).and_then(|library| match cli.command {
        Commands::Version => show_version(&library),
        Commands::Info { input } => show_info(library, &input),
        Commands::Encode {
            input,
            output,
            width,
            height,
            components,
            bits_per_sample,
            near_lossless,
            interleave,
            color_transformation,
            spiff,
            comment,
        } => {
            let frame_info = FrameInfo {
                width,
                height,
                bits_per_sample,
                component_count: components,
            };
            let options = EncodeOptions {
                near_lossless,
                interleave_mode: interleave.into(),
                color_transformation: color_transformation.into(),
                spiff_color_space: spiff.then(|| spiff_color_space(components)),
                comment: comment.map(String::into_bytes),
                ..EncodeOptions::default()
            };
            encode_image(library, &input, &output, frame_info, &options)
        }
        Commands::Decode {
            input,
            output,
            format,
        } => decode_image(library, &input, &output, &format),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_library(path: Option<&Path>) -> Result<Arc<CharlsLibrary>, Box<dyn std::error::Error>> {
    let library = match path {
        Some(path) => CharlsLibrary::load_from(path)?,
        None => CharlsLibrary::load()?,
    };
    Ok(Arc::new(library))
}

fn spiff_color_space(components: i32) -> SpiffColorSpace {
    match components {
        1 => SpiffColorSpace::Grayscale,
        3 => SpiffColorSpace::Rgb,
        4 => SpiffColorSpace::Cmyk,
        _ => SpiffColorSpace::None,
    }
}

fn show_version(library: &CharlsLibrary) -> Result<(), Box<dyn std::error::Error>> {
    println!("jpegls {}", env!("CARGO_PKG_VERSION"));
    println!("CharLS {}", library.version());
    Ok(())
}

fn show_info(library: Arc<CharlsLibrary>, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;

    println!("File: {:?}", input);
    println!("Size: {} bytes", data.len());
    println!();

    let comments = Arc::new(Mutex::new(Vec::new()));
    let application_data = Arc::new(Mutex::new(Vec::new()));

    let mut decoder = JpeglsDecoder::new(library)?;
    {
        let comments = Arc::clone(&comments);
        decoder.on_comment(move |comment| {
            comments.lock().map_err(|e| e.to_string())?.push(comment);
            Ok(())
        })?;
        let application_data = Arc::clone(&application_data);
        decoder.on_application_data(move |id, data| {
            application_data
                .lock()
                .map_err(|e| e.to_string())?
                .push((id, data.len()));
            Ok(())
        })?;
    }
    decoder.set_source(&data)?;

    if let Some(spiff) = decoder.try_read_spiff_header()? {
        println!("SPIFF header:");
        println!("  Profile:     {:?}", spiff.profile_id);
        println!("  Color space: {:?}", spiff.color_space);
        println!("  Compression: {:?}", spiff.compression_type);
        println!(
            "  Resolution:  {}x{} ({:?})",
            spiff.horizontal_resolution, spiff.vertical_resolution, spiff.resolution_units
        );
    }

    let header = *decoder.read_header()?;
    let info = header.frame_info;
    println!("Format: JPEG-LS");
    println!("  Dimensions:     {}x{}", info.width, info.height);
    println!("  Bit depth:      {} bits", info.bits_per_sample);
    println!("  Components:     {}", info.component_count);
    println!("  Near lossless:  {}", header.near_lossless);
    println!("  Interleave:     {:?}", header.interleave_mode);
    println!("  Transformation: {:?}", header.color_transformation);
    let pc = header.preset_coding_parameters;
    if !pc.is_default() {
        println!(
            "  Preset:         MAXVAL={} T1={} T2={} T3={} RESET={}",
            pc.maximum_sample_value, pc.threshold1, pc.threshold2, pc.threshold3, pc.reset_value
        );
    }
    println!("  Decoded size:   {} bytes", decoder.destination_size(0)?);
    drop(decoder);

    for comment in comments.lock().map_err(|e| e.to_string())?.iter() {
        println!("  Comment:        {}", String::from_utf8_lossy(comment));
    }
    for (id, size) in application_data.lock().map_err(|e| e.to_string())?.iter() {
        println!("  APP{}:           {} bytes", id, size);
    }

    Ok(())
}

fn encode_image(
    library: Arc<CharlsLibrary>,
    input: &Path,
    output: &Path,
    frame_info: FrameInfo,
    options: &EncodeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let expected = frame_info
        .pixel_data_size()
        .ok_or("image dimensions exceed the addressable memory size")?;
    let pixels = fs::read(input)?;
    if pixels.len() != expected {
        return Err(format!(
            "input holds {} bytes but {}x{}x{} at {} bits needs {}",
            pixels.len(),
            frame_info.width,
            frame_info.height,
            frame_info.component_count,
            frame_info.bits_per_sample,
            expected
        )
        .into());
    }

    let encoded = encode_to_vec(library, &pixels, frame_info, options)?;
    fs::write(output, &encoded)?;
    println!(
        "✓ Encoded {}x{} image to {:?} ({} bytes, ratio {:.2})",
        frame_info.width,
        frame_info.height,
        output,
        encoded.len(),
        pixels.len() as f64 / encoded.len().max(1) as f64
    );
    Ok(())
}

fn decode_image(
    library: Arc<CharlsLibrary>,
    input: &Path,
    output: &Path,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let (pixels, header) = decode_to_vec(library, &data)?;
    let info = header.frame_info;

    match format {
        OutputFormat::Raw => fs::write(output, &pixels)?,
        OutputFormat::Pnm => write_pnm(output, &pixels, &info)?,
    }

    println!(
        "✓ Decoded {}x{} image ({} components) to {:?}",
        info.width, info.height, info.component_count, output
    );
    Ok(())
}

fn write_pnm(path: &Path, pixels: &[u8], info: &FrameInfo) -> Result<(), Box<dyn std::error::Error>> {
    let magic = match info.component_count {
        1 => "P5",
        3 => "P6",
        n => return Err(format!("PGM/PPM output needs 1 or 3 components, image has {n}").into()),
    };

    let mut file = fs::File::create(path)?;
    writeln!(file, "{}", magic)?;
    writeln!(file, "{} {}", info.width, info.height)?;
    writeln!(file, "{}", (1u32 << info.bits_per_sample) - 1)?;
    if info.bytes_per_sample() == 1 {
        file.write_all(pixels)?;
    } else {
        // PNM stores 16-bit samples big-endian.
        let swapped: Vec<u8> = pixels
            .chunks_exact(2)
            .flat_map(|sample| [sample[1], sample[0]])
            .collect();
        file.write_all(&swapped)?;
    }

    Ok(())
}
