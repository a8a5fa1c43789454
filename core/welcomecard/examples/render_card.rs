//! Render a welcome card from a background and an optional avatar.
//!
//! Usage:
//!   cargo run --example render_card -- [BACKGROUND] [AVATAR] [OUTPUT]
//!
//! Without a background a synthetic one (dark gradient with a white disk) is
//! used. Output defaults to `welcome.png` in the current directory.

use std::path::PathBuf;

use image::RgbaImage;
use welcomecard::{CardPipeline, OutputFormat};

fn synthetic_background() -> RgbaImage {
    let (width, height) = (1200u32, 500u32);
    let (cx, cy, r) = (820.0f32, 250.0f32, 160.0f32);
    RgbaImage::from_fn(width, height, |x, y| {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        let d = (dx * dx + dy * dy).sqrt();
        if d <= r {
            image::Rgba([255, 255, 255, 255])
        } else if d <= r + 6.0 {
            image::Rgba([10, 10, 10, 255])
        } else {
            image::Rgba([(x * 80 / width) as u8, 20, (y * 120 / height) as u8, 255])
        }
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let background_path = args.next().map(PathBuf::from);
    let avatar_path = args.next().map(PathBuf::from);
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("welcome.png"));

    let pipeline = CardPipeline::from_env().expect("invalid configuration");

    let background = match &background_path {
        Some(path) => pipeline
            .background(|| std::fs::read(path).ok())
            .unwrap_or_else(|e| panic!("failed to load {}: {e}", path.display())),
        None => pipeline
            .background(|| {
                let mut buffer = Vec::new();
                synthetic_background()
                    .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
                    .ok()?;
                Some(buffer)
            })
            .expect("failed to build synthetic background"),
    };

    let avatar = avatar_path.as_ref().and_then(|p| std::fs::read(p).ok());

    let card = pipeline
        .produce_card(background, avatar.as_deref())
        .expect("failed to render card");

    let ext = match card.format {
        OutputFormat::Png => "png",
        OutputFormat::Webp => "webp",
    };
    let output = output.with_extension(ext);
    std::fs::write(&output, &card.data).expect("failed to write card");

    println!(
        "{} ({}x{}, {} bytes) slot=({}, {}, d={}){}",
        output.display(),
        card.width,
        card.height,
        card.data.len(),
        card.slot.left(),
        card.slot.top(),
        card.slot.diameter(),
        if card.placeholder_avatar {
            " placeholder avatar"
        } else {
            ""
        },
    );
}
