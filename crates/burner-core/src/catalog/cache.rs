//! On-disk image cache keyed by file name.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use super::fetch::Fetcher;
use super::{CatalogError, ImageSpec, VersionSource};
use crate::device::Device;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CatalogError {
    let path = path.to_path_buf();
    move |source| CatalogError::Io { path, source }
}

/// A file present in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub path: PathBuf,
    /// True when this call downloaded it.
    pub downloaded: bool,
}

/// Download-once cache shared by every flashing thread.
///
/// Concurrent `ensure` calls for the same file name are serialized on a
/// per-name lock: the first caller downloads, the others wait and then find
/// the file in place. Different names download in parallel.
pub struct ImageCache<F: Fetcher> {
    dir: PathBuf,
    fetcher: F,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<F: Fetcher> ImageCache<F> {
    pub fn new(dir: impl Into<PathBuf>, fetcher: F) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn guard_for(&self, filename: &str) -> Arc<Mutex<()>> {
        let mut map = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(filename.to_string()).or_default())
    }

    /// Make sure `spec` is in the cache and return its path.
    pub fn ensure(&self, spec: &ImageSpec) -> Result<CachedImage, CatalogError> {
        let guard = self.guard_for(spec.filename);
        let _held = guard.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.dir.join(spec.filename);
        if path.is_file() {
            debug!(file = %spec.filename, "Cache hit");
            return Ok(CachedImage {
                path,
                downloaded: false,
            });
        }

        info!(file = %spec.filename, url = %spec.url, "Downloading image");
        self.download(spec, &path)?;
        Ok(CachedImage {
            path,
            downloaded: true,
        })
    }

    fn download(&self, spec: &ImageSpec, path: &Path) -> Result<(), CatalogError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let tmp = self.dir.join(format!("{}.tmp", spec.filename));
        let file = File::create(&tmp).map_err(io_err(&tmp))?;
        let mut out = BufWriter::new(file);

        let fetched = self
            .fetcher
            .fetch(spec.url, &mut out)
            .map_err(|source| CatalogError::Download {
                url: spec.url.to_string(),
                source,
            })
            .and_then(|bytes| {
                out.flush().map_err(io_err(&tmp))?;
                Ok(bytes)
            });

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(out);
                if let Err(rm) = fs::remove_file(&tmp) {
                    warn!(file = %tmp.display(), error = %rm, "Could not remove partial download");
                }
                return Err(e);
            }
        };
        drop(out);

        fs::rename(&tmp, path).map_err(io_err(path))?;
        info!(file = %spec.filename, bytes, "Image cached");
        Ok(())
    }

    /// Latest published version for `source`, fetched once into the cache.
    pub fn latest_version(&self, source: VersionSource) -> Result<String, CatalogError> {
        let spec = ImageSpec {
            filename: source.filename(),
            url: source.url(),
        };
        let cached = self.ensure(&spec)?;
        let text = fs::read_to_string(&cached.path).map_err(|source| CatalogError::Io {
            path: cached.path.clone(),
            source,
        })?;
        Ok(text.trim().to_string())
    }

    /// Fill in the latest version of every device. Lookup failures are
    /// logged and leave the field empty.
    pub fn resolve_latest<'a>(&self, devices: impl IntoIterator<Item = &'a Device>) {
        for device in devices {
            let source = VersionSource::for_device(device);
            match self.latest_version(source) {
                Ok(version) => {
                    device.set_latest_firmware(version);
                }
                Err(e) => warn!(host = %device.ipv4, error = %e, "No latest version"),
            }
        }
    }

    /// Delete cached version files so the next lookup fetches fresh ones.
    pub fn purge_versions(&self) -> Result<(), CatalogError> {
        for source in VersionSource::ALL {
            let path = self.dir.join(source.filename());
            match fs::remove_file(&path) {
                Ok(()) => debug!(file = %path.display(), "Purged version file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(CatalogError::Io { path, source }),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::catalog::CountingFetcher;
    use crate::device::DeviceKind;

    const SPEC: ImageSpec = ImageSpec {
        filename: "oakridge.sysloader.ubnt.tar.gz",
        url: "http://images.test/ubntunifi/latest.tar.gz",
    };

    #[test]
    fn test_concurrent_ensure_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new()
            .serve(SPEC.url, b"image-bytes")
            .with_delay(Duration::from_millis(50));
        let cache = ImageCache::new(dir.path(), fetcher);

        let results: Vec<CachedImage> = thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| cache.ensure(&SPEC))).collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });

        assert_eq!(cache.fetcher().count(SPEC.url), 1);
        assert_eq!(results.iter().filter(|r| r.downloaded).count(), 1);
        assert!(results.iter().all(|r| r.path == dir.path().join(SPEC.filename)));
        assert_eq!(fs::read(dir.path().join(SPEC.filename)).unwrap(), b"image-bytes");
    }

    #[test]
    fn test_cache_is_keyed_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"x"));
        let other = ImageSpec {
            filename: "acpro.tar.gz",
            url: SPEC.url,
        };

        cache.ensure(&SPEC).unwrap();
        cache.ensure(&other).unwrap();
        cache.ensure(&SPEC).unwrap();
        assert_eq!(cache.fetcher().count(SPEC.url), 2);
    }

    #[test]
    fn test_failed_download_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"x").fail_first(1));

        assert!(matches!(
            cache.ensure(&SPEC),
            Err(CatalogError::Download { .. })
        ));
        assert!(!dir.path().join(SPEC.filename).exists());
        assert!(!dir.path().join(format!("{}.tmp", SPEC.filename)).exists());

        // A later caller retries.
        assert!(cache.ensure(&SPEC).unwrap().downloaded);
    }

    #[test]
    fn test_latest_version_and_purge() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new()
            .serve(VersionSource::Ap152.url(), b" v4.1.2\n")
            .serve(VersionSource::Unifi.url(), b"v4.1.0\n");
        let cache = ImageCache::new(dir.path(), fetcher);

        let oak = Device::new(
            "10.0.0.1".parse().unwrap(),
            "34:e7:0b:00:00:01",
            "A820",
            "QTS_A820",
            "v4.0.0",
            DeviceKind::Oakridge,
        );
        let erx = Device::new(
            "10.0.0.2".parse().unwrap(),
            "78:8a:20:00:00:01",
            "EdgeRouter_ER-X",
            "UBNT_EdgeRouter-X",
            "v1.10.11",
            DeviceKind::UbiquitiEdgeRouter,
        );
        cache.resolve_latest([&oak, &erx]);
        assert_eq!(oak.latest_firmware(), "v4.1.2");
        assert_eq!(erx.latest_firmware(), "v4.1.0");

        assert_eq!(cache.latest_version(VersionSource::Ap152).unwrap(), "v4.1.2");
        assert_eq!(cache.fetcher().count(VersionSource::Ap152.url()), 1);

        cache.purge_versions().unwrap();
        assert!(!dir.path().join(VersionSource::Ap152.filename()).exists());
        cache.latest_version(VersionSource::Ap152).unwrap();
        assert_eq!(cache.fetcher().count(VersionSource::Ap152.url()), 2);
        cache.purge_versions().unwrap();
    }
}
