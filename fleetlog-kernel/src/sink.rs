//! File sink: run directory allocation and collision-resistant file naming.

use crate::error::{CollectError, FetchError};
use crate::models::Instance;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Names this long or longer get shortened
pub const MAX_FILE_NAME: usize = 240;
const KEEP_FILE_NAME: usize = 230;
const SUFFIX_LEN: usize = 5;
const MAX_EXTENSION: usize = 16;
const DNS_PREFIX_LEN: usize = 7;
const CLOUD_DNS_NOISE: &[&str] = &["ec2", "computeamazonaws", "computeinternal", "amazonaws"];

/// Allocates the unique directory that holds every file of one run
pub fn allocate_run_dir(base: &Path, prefix: &str) -> Result<PathBuf, FetchError> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(base)
        .map_err(|source| FetchError::Setup {
            path: base.to_path_buf(),
            source,
        })?;
    // the run directory outlives the process
    Ok(dir.keep())
}

/// `<instance-id>-<dns>-`, shared by every file of one instance
pub fn instance_prefix(instance: &Instance) -> String {
    let mut dns: String = instance
        .public_dns_name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase();
    for noise in CLOUD_DNS_NOISE {
        dns = dns.replace(noise, "");
    }
    dns.truncate(DNS_PREFIX_LEN);
    format!("{}-{}-", instance.instance_id, dns)
}

/// Keeps file names under filesystem limits; truncated names get a random
/// suffix before the original extension.
pub fn shorten(name: &str) -> String {
    if name.len() < MAX_FILE_NAME {
        return name.to_string();
    }

    let ext = match name.rfind('.') {
        Some(i) if name.len() - i <= MAX_EXTENSION => &name[i..],
        _ => "",
    };
    let mut cut = KEEP_FILE_NAME;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    let short = format!("{}{}{}", &name[..cut], random_suffix(SUFFIX_LEN), ext);
    info!(old = name, new = %short, "file name too long; renamed");
    short
}

fn random_suffix(n: usize) -> String {
    let mut out = String::with_capacity(n);
    while out.len() < n {
        let id = uuid::Uuid::new_v4().simple().to_string();
        out.extend(id.chars().take(n - out.len()));
    }
    out
}

/// Writes one instance's outputs into the run directory.
///
/// Names are handed out once per instance across all stages, so no output
/// ever replaces an earlier one.
#[derive(Debug)]
pub struct LogSink {
    dir: PathBuf,
    prefix: String,
    instance_id: String,
    names: Mutex<HashSet<String>>,
}

impl LogSink {
    pub fn new(run_dir: &Path, instance: &Instance) -> Self {
        Self {
            dir: run_dir.to_path_buf(),
            prefix: instance_prefix(instance),
            instance_id: instance.instance_id.clone(),
            names: Mutex::new(HashSet::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(shorten(&format!("{}{}", self.prefix, file_name)))
    }

    /// First free name out of `file_name`, `fallback`, then numbered variants
    pub fn claim(&self, file_name: &str, fallback: Option<&str>) -> String {
        let mut names = self.names.lock();
        for name in std::iter::once(file_name).chain(fallback) {
            if names.insert(name.to_string()) {
                if name != file_name {
                    debug!(instance_id = %self.instance_id, taken = file_name, file = name, "file name taken; using fallback");
                }
                return name.to_string();
            }
        }

        let base = fallback.unwrap_or(file_name);
        let mut n = 1;
        loop {
            let name = format!("{}.{}", base, n);
            if names.insert(name.clone()) {
                debug!(instance_id = %self.instance_id, taken = file_name, file = %name, "file name taken; numbered");
                return name;
            }
            n += 1;
        }
    }

    pub async fn persist(
        &self,
        file_name: &str,
        fallback: Option<&str>,
        data: &[u8],
    ) -> Result<PathBuf, CollectError> {
        let path = self.path_for(&self.claim(file_name, fallback));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| CollectError::CreateFile {
                path: path.clone(),
                instance_id: self.instance_id.clone(),
                source,
            })?;

        let write_err = |source| CollectError::WriteFile {
            path: path.clone(),
            instance_id: self.instance_id.clone(),
            source,
        };
        file.write_all(data).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        debug!(file_path = %path.display(), bytes = data.len(), "wrote");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_prefix_strips_cloud_dns() {
        let inst = Instance::new(
            "i-0123456789abcdef0",
            "54.1.2.3",
            "ec2-54-1-2-3.us-west-2.compute.amazonaws.com",
        );
        assert_eq!(instance_prefix(&inst), "i-0123456789abcdef0-54123us-");
    }

    #[test]
    fn test_instance_prefix_short_or_missing_dns() {
        assert_eq!(instance_prefix(&Instance::new("i-1", "1.1.1.1", "")), "i-1--");
        assert_eq!(instance_prefix(&Instance::new("i-2", "", "Node-A")), "i-2-nodea-");
    }

    #[test]
    fn test_shorten_leaves_short_names() {
        assert_eq!(shorten("i-1-abc-kernel.out.log"), "i-1-abc-kernel.out.log");
        let just_under = "a".repeat(MAX_FILE_NAME - 1);
        assert_eq!(shorten(&just_under), just_under);
    }

    #[test]
    fn test_shorten_long_names_keeps_extension() {
        let long = format!("{}.log", "x".repeat(300));
        let short = shorten(&long);

        assert_eq!(short.len(), KEEP_FILE_NAME + SUFFIX_LEN + ".log".len());
        assert!(short.starts_with(&"x".repeat(KEEP_FILE_NAME)));
        assert!(short.ends_with(".log"));
        let suffix = &short[KEEP_FILE_NAME..KEEP_FILE_NAME + SUFFIX_LEN];
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_shorten_collisions_get_distinct_names() {
        // differ only past the truncation point
        let a = format!("{}-first.out.log", "s".repeat(260));
        let b = format!("{}-second.out.log", "s".repeat(260));
        assert_ne!(shorten(&a), shorten(&b));
    }

    #[test]
    fn test_shorten_respects_char_boundaries() {
        let long = "é".repeat(200);
        let short = shorten(&long);
        assert!(short.len() < MAX_FILE_NAME);
    }

    #[test]
    fn test_allocate_run_dir_is_unique() {
        let base = tempfile::tempdir().unwrap();
        let a = allocate_run_dir(base.path(), "fleet-logs").unwrap();
        let b = allocate_run_dir(base.path(), "fleet-logs").unwrap();

        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("fleet-logs"));
    }

    #[test]
    fn test_allocate_run_dir_missing_base() {
        let err = allocate_run_dir(Path::new("/nonexistent/base"), "x").unwrap_err();
        assert!(matches!(err, FetchError::Setup { .. }));
    }

    #[tokio::test]
    async fn test_persist_writes_prefixed_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::new(dir.path(), &Instance::new("i-9", "", "ip-10-0-0-9.ec2.internal"));

        let path = sink.persist("kernel.out.log", None, b"hello").await.unwrap();
        assert_eq!(path.parent().unwrap(), dir.path());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(sink.prefix()));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_persist_reports_create_failure() {
        let sink = LogSink::new(Path::new("/nonexistent/run"), &Instance::new("i-9", "", ""));
        let err = sink.persist("x.log", None, b"data").await.unwrap_err();
        assert!(matches!(err, CollectError::CreateFile { .. }));
    }

    #[test]
    fn test_claim_never_hands_out_a_name_twice() {
        let sink = LogSink::new(Path::new("/run"), &Instance::new("i-9", "", ""));

        assert_eq!(sink.claim("kernel.out.log", None), "kernel.out.log");
        assert_eq!(
            sink.claim("kernel.out.log", Some("var-log-kernel.out.log")),
            "var-log-kernel.out.log"
        );
        assert_eq!(
            sink.claim("kernel.out.log", Some("var-log-kernel.out.log")),
            "var-log-kernel.out.log.1"
        );
        assert_eq!(sink.claim("kernel.out.log", None), "kernel.out.log.1");
    }

    #[tokio::test]
    async fn test_persist_keeps_earlier_output_on_name_clash() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::new(dir.path(), &Instance::new("i-9", "", ""));

        let first = sink.persist("v1-enis", None, b"probe").await.unwrap();
        let second = sink
            .persist("v1-enis", Some("var-log-v1-enis"), b"listed")
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"probe");
        assert_eq!(std::fs::read(&second).unwrap(), b"listed");
    }
}
