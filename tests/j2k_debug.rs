//! End-to-end encode/decode scenarios (spec.md §8's concrete scenarios).

use j2k_codec_rs::jpeg2000::decoder::J2kDecoder;
use j2k_codec_rs::jpeg2000::encoder::{EncodeInput, J2kEncoder};
use j2k_codec_rs::jpeg2000::image::J2kComponentInfo;
use j2k_codec_rs::{DecoderOptions, EncoderOptions, ProgressionOrder};

fn gray_component() -> J2kComponentInfo {
    J2kComponentInfo { depth: 8, is_signed: false, dx: 1, dy: 1 }
}

fn encode_gray(samples: Vec<i32>, width: u32, height: u32, options: EncoderOptions) -> Vec<u8> {
    let encoder = J2kEncoder::new(options).unwrap();
    let input = EncodeInput {
        width,
        height,
        components: vec![gray_component()],
        samples: &[samples],
    };
    encoder.encode(&input).unwrap()
}

fn psnr(original: &[i32], decoded: &[i32], peak: f64) -> f64 {
    let mse: f64 = original
        .iter()
        .zip(decoded.iter())
        .map(|(&a, &b)| {
            let d = (a - b) as f64;
            d * d
        })
        .sum::<f64>()
        / original.len() as f64;
    if mse == 0.0 {
        f64::INFINITY
    } else {
        20.0 * peak.log10() - 10.0 * mse.log10()
    }
}

/// Scenario 1: 8x8 grayscale gradient, lossless, 0 decomposition levels.
#[test]
fn scenario_1_tiny_gradient_lossless_no_levels() {
    let samples: Vec<i32> = (0..64).map(|i| ((i % 8) + (i / 8)) % 256).collect();
    let options = EncoderOptions {
        num_levels: 0,
        lossless: true,
        code_block_w: 8,
        code_block_h: 8,
        ..Default::default()
    };
    let encoded = encode_gray(samples.clone(), 8, 8, options);
    assert!(encoded.len() <= 200, "encoded size {} exceeds budget", encoded.len());

    let decoder = J2kDecoder::new(DecoderOptions::default());
    let image = decoder.decode(&encoded).unwrap();
    assert_eq!(image.tiles[0].components[0].data, samples);
}

/// Scenario 2: 16x16 uniform 128, lossless, 1 decomposition level.
#[test]
fn scenario_2_uniform_lossless_one_level() {
    let samples = vec![128i32; 16 * 16];
    let options = EncoderOptions {
        num_levels: 1,
        lossless: true,
        code_block_w: 16,
        code_block_h: 16,
        ..Default::default()
    };
    let encoded = encode_gray(samples.clone(), 16, 16, options);
    assert!(encoded.len() <= 80, "encoded size {} exceeds budget", encoded.len());

    let decoder = J2kDecoder::new(DecoderOptions::default());
    let image = decoder.decode(&encoded).unwrap();
    assert_eq!(image.tiles[0].components[0].data, samples);
}

/// Scenario 3: 64x64 gradient, lossless, 5 decomposition levels, >= 4x compression.
#[test]
fn scenario_3_gradient_lossless_five_levels() {
    let samples: Vec<i32> = (0..64 * 64).map(|i| ((i % 64) + (i / 64)) % 256).collect();
    let options = EncoderOptions {
        num_levels: 5,
        lossless: true,
        code_block_w: 64,
        code_block_h: 64,
        ..Default::default()
    };
    let encoded = encode_gray(samples.clone(), 64, 64, options);
    assert!(
        encoded.len() * 4 <= samples.len(),
        "expected >= 4x compression, got {} bytes for {} samples",
        encoded.len(),
        samples.len()
    );

    let decoder = J2kDecoder::new(DecoderOptions::default());
    let image = decoder.decode(&encoded).unwrap();
    assert_eq!(image.tiles[0].components[0].data, samples);
}

/// Scenario 4: 128x128 sinusoid, lossy quality=80, PSNR >= 35 dB, >= 5:1 ratio.
#[test]
fn scenario_4_sinusoid_lossy_quality_80() {
    let w = 128u32;
    let samples: Vec<i32> = (0..w as i64 * w as i64)
        .map(|i| {
            let x = (i % w as i64) as f64;
            let y = (i / w as i64) as f64;
            let v = 128.0 + 50.0 * (0.1 * x).sin() + 30.0 * (0.1 * y).cos();
            v.round().clamp(0.0, 255.0) as i32
        })
        .collect();
    let options = EncoderOptions {
        num_levels: 5,
        lossless: false,
        quality: 80,
        num_layers: 1,
        ..Default::default()
    };
    let encoded = encode_gray(samples.clone(), w, w, options);
    assert!(
        encoded.len() * 5 <= samples.len(),
        "expected >= 5:1 compression, got {} bytes for {} samples",
        encoded.len(),
        samples.len()
    );

    let decoder = J2kDecoder::new(DecoderOptions::default());
    let image = decoder.decode(&encoded).unwrap();
    let decoded = &image.tiles[0].components[0].data;
    assert!(psnr(&samples, decoded, 255.0) >= 35.0);
}

/// Scenario 6: 64x64 RGB gradient, 3 components, lossy quality=85, MCT enabled.
#[test]
fn scenario_6_rgb_gradient_with_mct() {
    let w = 64u32;
    let mut samples = Vec::new();
    for c in 0..3i32 {
        let plane: Vec<i32> = (0..w as i64 * w as i64)
            .map(|i| {
                let x = (i % w as i64) as i32;
                let y = (i / w as i64) as i32;
                (x + y + c * 85) % 256
            })
            .collect();
        samples.push(plane);
    }
    let options = EncoderOptions {
        num_levels: 4,
        lossless: false,
        quality: 85,
        mct: true,
        ..Default::default()
    };
    let encoder = J2kEncoder::new(options).unwrap();
    let input = EncodeInput {
        width: w,
        height: w,
        components: vec![gray_component(); 3],
        samples: &samples,
    };
    let encoded = encoder.encode(&input).unwrap();

    let decoder = J2kDecoder::new(DecoderOptions::default());
    let image = decoder.decode(&encoded).unwrap();
    for c in 0..3 {
        let decoded = &image.tiles[0].components[c].data;
        assert!(
            psnr(&samples[c], decoded, 255.0) >= 30.0,
            "component {c} PSNR too low"
        );
    }
}

/// Scenario 7: progression-order permutation — decoded samples must be
/// byte-identical across all five progression orders.
#[test]
fn scenario_7_progression_order_invariance() {
    let samples: Vec<i32> = (0..64 * 64).map(|i| ((i % 64) + (i / 64)) % 256).collect();
    let orders = [
        ProgressionOrder::Lrcp,
        ProgressionOrder::Rlcp,
        ProgressionOrder::Rpcl,
        ProgressionOrder::Pcrl,
        ProgressionOrder::Cprl,
    ];

    let mut reference: Option<Vec<i32>> = None;
    for order in orders {
        let options = EncoderOptions {
            num_levels: 5,
            lossless: true,
            code_block_w: 64,
            code_block_h: 64,
            progression_order: order,
            ..Default::default()
        };
        let encoded = encode_gray(samples.clone(), 64, 64, options);
        let decoder = J2kDecoder::new(DecoderOptions::default());
        let image = decoder.decode(&encoded).unwrap();
        let decoded = image.tiles[0].components[0].data.clone();
        match &reference {
            None => reference = Some(decoded),
            Some(expected) => assert_eq!(&decoded, expected, "progression order {order:?} diverged"),
        }
    }
}
