//! jpegexp CLI - JPEG 2000 Part 1 / HTJ2K command-line utility.
//!
//! Encodes raw 8-bit pixel data to a J2K codestream and decodes a codestream
//! back to raw pixels, for medical (DICOM) and geospatial imaging workflows.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;

use j2k_codec_rs::jpeg2000::decoder::J2kDecoder;
use j2k_codec_rs::jpeg2000::encoder::{EncodeInput, J2kEncoder};
use j2k_codec_rs::jpeg2000::image::J2kComponentInfo;
use j2k_codec_rs::{DecoderOptions, EncoderOptions, ProgressionOrder};

/// JPEG 2000 Part 1 / HTJ2K codec for encoding and decoding raw imagery
#[derive(Parser)]
#[command(name = "jpegexp")]
#[command(author = "jpegexp-rs contributors")]
#[command(version)]
#[command(about = "Encode/decode JPEG 2000 (Part 1) and HTJ2K codestreams", long_about = None)]
#[command(after_help = "EXAMPLES:
    jpegexp encode -i pixels.raw -o image.j2k -w 512 -H 512 --lossless
    jpegexp encode -i pixels.raw -o image.j2k -w 512 -H 512 -n 3 --quality 70 --layers 4
    jpegexp decode -i image.j2k -o pixels.raw
    jpegexp info -i image.j2k")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a J2K/HTJ2K codestream to raw pixels
    #[command(visible_alias = "d")]
    Decode {
        /// Path to the input codestream
        #[arg(short, long)]
        input: PathBuf,

        /// Path for the decoded raw pixel output
        #[arg(short, long)]
        output: PathBuf,

        /// Abort on the first malformed/truncated segment instead of
        /// zero-filling and continuing
        #[arg(long)]
        strict: bool,
    },

    /// Encode raw 8-bit pixel data to a J2K codestream
    #[command(visible_alias = "e")]
    Encode {
        /// Path to raw pixel data (interleaved, row-major, one byte/sample)
        #[arg(short, long)]
        input: PathBuf,

        /// Path for the encoded codestream
        #[arg(short, long)]
        output: PathBuf,

        /// Image width in pixels
        #[arg(short, long)]
        width: u32,

        /// Image height in pixels
        #[arg(short = 'H', long)]
        height: u32,

        /// Number of color components (1=grayscale, 3=RGB)
        #[arg(short = 'n', long, default_value_t = 1)]
        components: u32,

        /// Bits per sample (1-16)
        #[arg(long, default_value_t = 8)]
        depth: u8,

        /// Reversible (5/3 DWT, bit-exact) instead of irreversible (9/7, lossy)
        #[arg(long)]
        lossless: bool,

        /// Lossy quality, 1-100 (ignored when --lossless is set)
        #[arg(short, long, default_value_t = 80)]
        quality: u8,

        /// Number of quality layers
        #[arg(long, default_value_t = 1)]
        layers: u16,

        /// Number of DWT decomposition levels
        #[arg(long, default_value_t = 5)]
        dwt_levels: u8,

        /// Packet progression order
        #[arg(long, value_enum, default_value_t = ProgressionArg::Lrcp)]
        progression: ProgressionArg,

        /// Apply the standard MCT (RCT/ICT) when there are >= 3 components
        #[arg(long, default_value_t = true)]
        mct: bool,

        /// Use the HTJ2K (Part 15) block coder instead of EBCOT
        #[arg(long)]
        htj2k: bool,
    },

    /// Display codestream metadata
    #[command(visible_alias = "i")]
    Info {
        /// Path to the codestream to inspect
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressionArg {
    Lrcp,
    Rlcp,
    Rpcl,
    Pcrl,
    Cprl,
}

impl From<ProgressionArg> for ProgressionOrder {
    fn from(value: ProgressionArg) -> Self {
        match value {
            ProgressionArg::Lrcp => ProgressionOrder::Lrcp,
            ProgressionArg::Rlcp => ProgressionOrder::Rlcp,
            ProgressionArg::Rpcl => ProgressionOrder::Rpcl,
            ProgressionArg::Pcrl => ProgressionOrder::Pcrl,
            ProgressionArg::Cprl => ProgressionOrder::Cprl,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Decode { input, output, strict } => decode_image(&input, &output, strict),
        Commands::Encode {
            input,
            output,
            width,
            height,
            components,
            depth,
            lossless,
            quality,
            layers,
            dwt_levels,
            progression,
            mct,
            htj2k,
        } => encode_image(
            &input, &output, width, height, components, depth, lossless, quality, layers,
            dwt_levels, progression, mct, htj2k,
        ),
        Commands::Info { input } => show_info(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn decode_image(input: &PathBuf, output: &PathBuf, strict: bool) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let decoder = J2kDecoder::new(DecoderOptions { strict });
    let image = decoder.decode(&data)?;

    let mut pixels = Vec::new();
    for tile in &image.tiles {
        for component in &tile.components {
            pixels.extend(component.data.iter().map(|&v| v.clamp(0, 255) as u8));
        }
    }
    fs::write(output, &pixels)?;

    println!(
        "Decoded {}x{} image ({} components) to {output:?}",
        image.width,
        image.height,
        image.components.len()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn encode_image(
    input: &PathBuf,
    output: &PathBuf,
    width: u32,
    height: u32,
    components: u32,
    depth: u8,
    lossless: bool,
    quality: u8,
    layers: u16,
    dwt_levels: u8,
    progression: ProgressionArg,
    mct: bool,
    htj2k: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if htj2k {
        return Err("HTJ2K encoding is not wired into this CLI yet; use the library's EncoderOptions directly".into());
    }

    let raw = fs::read(input)?;
    let sample_count = (width * height) as usize;
    if raw.len() < sample_count * components as usize {
        return Err("input file is smaller than width * height * components".into());
    }

    let mut samples = Vec::with_capacity(components as usize);
    for c in 0..components as usize {
        let plane = raw[c * sample_count..(c + 1) * sample_count]
            .iter()
            .map(|&b| b as i32)
            .collect();
        samples.push(plane);
    }

    let options = EncoderOptions {
        num_levels: dwt_levels,
        lossless,
        quality,
        num_layers: layers,
        progression_order: progression.into(),
        mct,
        ..Default::default()
    };
    let encoder = J2kEncoder::new(options)?;

    let input = EncodeInput {
        width,
        height,
        components: vec![
            J2kComponentInfo { depth, is_signed: false, dx: 1, dy: 1 };
            components as usize
        ],
        samples: &samples,
    };
    let encoded = encoder.encode(&input)?;

    fs::write(output, &encoded)?;
    println!("Encoded {width}x{height} image ({components} components) to {output:?} ({} bytes)", encoded.len());
    Ok(())
}

fn show_info(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    println!("File: {input:?}");
    println!("Size: {} bytes", data.len());
    println!();

    let decoder = J2kDecoder::new(DecoderOptions::default());
    let image = decoder.decode(&data)?;

    println!("Dimensions: {}x{}", image.width, image.height);
    println!("Components: {}", image.components.len());
    println!("Tile size:  {}x{}", image.tile_width, image.tile_height);
    if let Some(cod) = &image.cod {
        println!("DWT levels: {}", cod.decomposition_levels);
        println!("Layers:     {}", cod.number_of_layers);
        println!(
            "Progression: {}",
            match cod.progression_order {
                0 => "LRCP",
                1 => "RLCP",
                2 => "RPCL",
                3 => "PCRL",
                4 => "CPRL",
                _ => "Unknown",
            }
        );
        println!("Lossless:   {}", cod.transformation == 1);
    }
    if let Some(cap) = &image.cap {
        println!("HTJ2K:      {}", cap.is_htj2k());
    }
    if image.roi.is_some() {
        println!("ROI:        Present");
    }
    println!("Tiles decoded: {}", image.tiles.len());

    Ok(())
}
