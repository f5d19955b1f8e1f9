//! CLI command implementations

pub mod info;
pub mod validate;

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use rawstack_core::{ByteOrder, FileDescriptor, FrameGap, PixelEncoding};
use rawstack_io::{DecodeOptions, ProxySettings};

use crate::DescriptorArgs;

/// Builds a descriptor from an optional YAML sidecar plus flag overrides.
pub fn build_descriptor(args: &DescriptorArgs) -> Result<FileDescriptor> {
    let mut desc = match &args.descriptor {
        Some(path) => load_sidecar(path)?,
        None => FileDescriptor::default(),
    };

    if let Some(input) = args.input.as_deref().filter(|s| s.starts_with("https://")) {
        bail!("https is not supported, use an http:// or file:// URL: {}", input);
    }
    match (&args.input, &args.name) {
        (Some(base), Some(name)) => desc = desc.with_url(base.clone(), name.clone()),
        (Some(input), None) if is_url(input) => {
            let (base, name) = split_url(input);
            desc = desc.with_url(base, name);
        }
        (Some(input), None) => desc = desc.with_path(input),
        (None, Some(_)) => bail!("a file name needs a base URL"),
        (None, None) if args.descriptor.is_none() => bail!("no input file or descriptor given"),
        (None, None) => {}
    }

    if let Some(code) = args.type_code {
        desc.encoding = PixelEncoding::from_code(code).context("Invalid --type-code")?;
    }
    if let Some(name) = &args.encoding {
        desc.encoding = name
            .parse()
            .with_context(|| format!("Unknown pixel type: {}", name))?;
    }
    if desc.encoding.channels(4) > 1 && desc.samples_per_pixel < 3 {
        desc.samples_per_pixel = 3;
    }
    if let Some(samples) = args.samples {
        desc.samples_per_pixel = samples;
    }
    if let Some(w) = args.width {
        desc.width = w;
    }
    if let Some(h) = args.height {
        desc.height = h;
    }
    if args.little_endian {
        desc.byte_order = ByteOrder::Little;
    }
    if let Some(offset) = args.offset {
        desc.header_offset = offset;
    }
    if let Some(n) = args.images {
        desc.number_of_images = n;
    }
    if let Some(gap) = &args.gap {
        desc.gap = parse_gap(gap)?;
    }
    if let Some(compression) = &args.compression {
        desc.compression = compression
            .parse()
            .with_context(|| format!("Unknown compression: {}", compression))?;
    }

    if desc.width == 0 || desc.height == 0 {
        bail!("width and height are required (-W/-H or a descriptor file)");
    }
    Ok(desc)
}

/// Decode options from the shared flags.
pub fn decode_options(args: &DescriptorArgs, silent: bool) -> Result<DecodeOptions> {
    let proxy = args.proxy.as_deref().map(parse_proxy).transpose()?;
    Ok(DecodeOptions {
        silent,
        proxy,
        ..DecodeOptions::default()
    })
}

fn load_sidecar(path: &Path) -> Result<FileDescriptor> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptor: {}", path.display()))?;
    serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse descriptor: {}", path.display()))
}

fn parse_gap(s: &str) -> Result<FrameGap> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(FrameGap::FromDimensions);
    }
    let bytes = s
        .parse::<u64>()
        .with_context(|| format!("Invalid gap: {}", s))?;
    Ok(FrameGap::Bytes(bytes))
}

fn parse_proxy(s: &str) -> Result<ProxySettings> {
    match s.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .with_context(|| format!("Invalid proxy port: {}", port))?;
            Ok(ProxySettings {
                host: host.to_string(),
                port,
            })
        }
        None => Ok(ProxySettings::new(s)),
    }
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("file://")
}

fn split_url(url: &str) -> (String, String) {
    match url.rfind('/') {
        Some(i) => (url[..=i].to_string(), url[i + 1..].to_string()),
        None => (url.to_string(), String::new()),
    }
}

/// Format byte count for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
