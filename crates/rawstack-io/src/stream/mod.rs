//! Stream provider.
//!
//! Turns a descriptor's [`SourceLocation`] into one readable byte stream,
//! positioned at byte 0 of the source:
//!
//! - `Stream`: the caller's reader, taken exactly once
//! - `Directory`: `dir/file_name`; the file length is probed for validation
//! - `Url`: `base + file_name` through a [`UrlOpener`]
//!
//! Names ending in `.gz` (any case) are inflated on the fly, and the
//! effective content compression becomes [`Compression::Unknown`]. LZW
//! content is wrapped in a [`RandomAccessStream`].
//!
//! A missing file, a directory, or a descriptor that fails validation
//! yields `Ok(None)`; only real I/O failures are errors.

mod random_access;
mod remote;

pub use random_access::RandomAccessStream;
pub use remote::{HttpOpener, UrlOpener};

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};

use flate2::bufread::MultiGzDecoder;
use tracing::{debug, warn};

use rawstack_core::{Compression, FileDescriptor, SourceLocation};

use crate::error::{IoError, IoResult};
use crate::observer::{DecodeObserver, DecodeOptions};
use crate::validate;

static DEFAULT_OPENER: HttpOpener = HttpOpener { timeout: None };

/// An open source, ready for the decoder.
pub struct OpenedStream {
    /// Reader positioned at byte 0 of the source (after transport decoding).
    pub reader: Box<dyn Read + Send>,
    /// Path, URL or name, for diagnostics.
    pub source_name: String,
    /// Gzip transport was detected.
    pub gzip: bool,
    /// Content compression the decoder must apply.
    pub compression: Compression,
    /// Length of the raw source, when known and meaningful.
    pub probed_length: Option<u64>,
}

impl fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedStream")
            .field("source_name", &self.source_name)
            .field("gzip", &self.gzip)
            .field("compression", &self.compression)
            .field("probed_length", &self.probed_length)
            .finish_non_exhaustive()
    }
}

/// Opens descriptor sources.
pub struct StreamProvider<'a> {
    options: &'a DecodeOptions,
    observer: &'a dyn DecodeObserver,
    url_opener: &'a dyn UrlOpener,
}

impl<'a> StreamProvider<'a> {
    /// Provider using the built-in URL opener.
    pub fn new(options: &'a DecodeOptions, observer: &'a dyn DecodeObserver) -> Self {
        Self {
            options,
            observer,
            url_opener: &DEFAULT_OPENER,
        }
    }

    /// Replaces the URL opener.
    pub fn with_url_opener(mut self, opener: &'a dyn UrlOpener) -> Self {
        self.url_opener = opener;
        self
    }

    /// Validates the descriptor and opens its source.
    ///
    /// Returns `Ok(None)` for a missing file, a directory, or a failed
    /// validation (reported through the observer). A caller stream that
    /// was already consumed is a configuration error.
    pub fn open(&self, descriptor: &FileDescriptor) -> IoResult<Option<OpenedStream>> {
        let gzip = is_gzip_name(&descriptor.file_name);
        let compression = if gzip {
            Compression::Unknown
        } else {
            descriptor.compression
        };

        let probed_length = match &descriptor.source {
            SourceLocation::Directory(_) => {
                let path = descriptor.resolved_path().unwrap_or_default();
                match fs::metadata(&path) {
                    Ok(meta) if meta.is_dir() => {
                        debug!(path = %path.display(), "source is a directory");
                        return Ok(None);
                    }
                    Ok(meta) => Some(meta.len()),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {
                        debug!(path = %path.display(), "source file not found");
                        return Ok(None);
                    }
                    Err(err) => return Err(IoError::io(path.display().to_string(), err)),
                }
            }
            SourceLocation::Stream(_) | SourceLocation::Url(_) => None,
        };

        if let Err(err) = validate::check(
            descriptor,
            compression,
            probed_length,
            self.options.validation_threshold,
        ) {
            warn!(file = %descriptor.file_name, "{}", err.message);
            self.observer.validation_failed(&err);
            return Ok(None);
        }

        let (raw, source_name) = self.open_raw(descriptor)?;
        let reader: Box<dyn Read + Send> = if gzip {
            debug!(source = %source_name, "gzip transport");
            let buffered = BufReader::with_capacity(self.options.inflate_buffer_size, raw);
            Box::new(MultiGzDecoder::new(buffered))
        } else if compression.is_lzw_family() {
            Box::new(RandomAccessStream::new(raw))
        } else {
            raw
        };

        Ok(Some(OpenedStream {
            reader,
            source_name,
            gzip,
            compression,
            probed_length: if gzip { None } else { probed_length },
        }))
    }

    fn open_raw(&self, descriptor: &FileDescriptor) -> IoResult<(Box<dyn Read + Send>, String)> {
        match &descriptor.source {
            SourceLocation::Stream(handle) => {
                let reader = handle
                    .take()
                    .ok_or_else(|| IoError::configuration("input stream was already consumed"))?;
                let name = if descriptor.file_name.is_empty() {
                    "stream".to_string()
                } else {
                    descriptor.file_name.clone()
                };
                Ok((reader, name))
            }
            SourceLocation::Url(_) => {
                let url = descriptor.resolved_url().unwrap_or_default();
                let reader = self
                    .url_opener
                    .open(&url, self.options.proxy.as_ref())
                    .map_err(|e| IoError::io(url.clone(), e))?;
                Ok((reader, url))
            }
            SourceLocation::Directory(_) => {
                let path = descriptor.resolved_path().unwrap_or_default();
                let name = path.display().to_string();
                let file = File::open(&path).map_err(|e| IoError::io(name.clone(), e))?;
                Ok((Box::new(file), name))
            }
        }
    }
}

/// Returns `true` if `name` ends in `.gz`, ignoring case.
pub fn is_gzip_name(name: &str) -> bool {
    name.len() >= 3
        && name
            .get(name.len() - 3..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".gz"))
}
