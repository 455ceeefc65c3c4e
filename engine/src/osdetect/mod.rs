//! OS identity detection
//!
//! Determines the family and version of a target so the catalog can pick
//! an update command. Detection never raises past this boundary: every
//! failure mode resolves to an undetected identity, and the runner decides
//! what that means for the operation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::Channel;
use crate::models::Target;

/// Release-info file parsed on Linux-like targets.
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Probe that only produces a version-shaped line when a PowerShell
/// interpreter is present. Cheap, and its success signature is
/// unambiguous, so it runs before the release-file probe.
const WINDOWS_PROBE: &str =
    "powershell -NoProfile -NonInteractive -Command \"[System.Environment]::OSVersion.Version.ToString()\"";

/// Second-stage probe for Linux-like targets.
const RELEASE_PROBE: &str = "cat /etc/os-release";

/// Closed set of supported OS families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Ubuntu,
    Debian,
    Fedora,
    #[serde(rename = "centos")]
    CentOs,
    Arch,
    Windows,
}

impl OsFamily {
    /// Map a raw release identifier (`ID=` value or caller-supplied
    /// string) onto the closed set. Unknown identifiers map to `None`;
    /// there is no guessed fallback family.
    pub fn from_release_id(id: &str) -> Option<Self> {
        match id.trim().trim_matches('"').to_lowercase().as_str() {
            "ubuntu" => Some(OsFamily::Ubuntu),
            "debian" => Some(OsFamily::Debian),
            "fedora" => Some(OsFamily::Fedora),
            "centos" => Some(OsFamily::CentOs),
            "arch" => Some(OsFamily::Arch),
            "windows" => Some(OsFamily::Windows),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Ubuntu => "ubuntu",
            OsFamily::Debian => "debian",
            OsFamily::Fedora => "fedora",
            OsFamily::CentOs => "centos",
            OsFamily::Arch => "arch",
            OsFamily::Windows => "windows",
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected identity of a target. `family: None` means detection failed;
/// callers cache this per target, the detector does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsIdentity {
    pub family: Option<OsFamily>,
    pub version: Option<String>,

    /// Release identifier exactly as the target reported it. Present even
    /// when it maps to no supported family, so callers can name the
    /// unsupported distribution instead of reporting a blind failure.
    pub raw_id: Option<String>,
}

impl OsIdentity {
    pub fn unknown() -> Self {
        Self {
            family: None,
            version: None,
            raw_id: None,
        }
    }

    pub fn new(family: OsFamily, version: Option<String>) -> Self {
        Self {
            family: Some(family),
            version,
            raw_id: None,
        }
    }
}

impl std::fmt::Display for OsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let family = self.family.map_or("unknown", |fam| fam.as_str());
        let version = self.version.as_deref().unwrap_or("unknown");
        write!(f, "{} {}", family, version)
    }
}

/// Detect the OS identity of a target. Loopback targets are inspected
/// directly; remote targets are probed over the given channel.
pub async fn detect(
    target: &Target,
    channel: &mut dyn Channel,
    probe_timeout: Duration,
) -> OsIdentity {
    if target.is_loopback() {
        detect_local().await
    } else {
        detect_remote(channel, probe_timeout).await
    }
}

/// Inspect the local platform.
pub async fn detect_local() -> OsIdentity {
    if cfg!(target_os = "windows") {
        return OsIdentity::new(OsFamily::Windows, sysinfo::System::os_version());
    }

    match tokio::fs::read_to_string(OS_RELEASE_PATH).await {
        Ok(content) => parse_os_release(&content),
        Err(e) => {
            debug!("Could not read {}: {}", OS_RELEASE_PATH, e);
            OsIdentity::unknown()
        }
    }
}

/// Probe a remote target: PowerShell first, release file second. Any
/// transport failure resolves to unknown.
pub async fn detect_remote(channel: &mut dyn Channel, probe_timeout: Duration) -> OsIdentity {
    match run_probe(channel, WINDOWS_PROBE, probe_timeout).await {
        Ok((lines, 0)) => {
            if let Some(version) = lines.iter().find(|l| looks_like_version(l)) {
                return OsIdentity::new(OsFamily::Windows, Some(version.trim().to_string()));
            }
        }
        Ok(_) => {}
        Err(e) => {
            debug!("Windows probe failed: {}", e);
            return OsIdentity::unknown();
        }
    }

    match run_probe(channel, RELEASE_PROBE, probe_timeout).await {
        Ok((lines, 0)) => parse_os_release(&lines.join("\n")),
        Ok((_, code)) => {
            debug!("Release file probe exited with {}", code);
            OsIdentity::unknown()
        }
        Err(e) => {
            debug!("Release file probe failed: {}", e);
            OsIdentity::unknown()
        }
    }
}

async fn run_probe(
    channel: &mut dyn Channel,
    command: &str,
    probe_timeout: Duration,
) -> Result<(Vec<String>, i32), crate::errors::EngineError> {
    tokio::time::timeout(probe_timeout, async {
        let mut stream = channel.run(command).await?;
        let mut lines = Vec::new();
        while let Some(line) = stream.next_line().await {
            lines.push(line);
        }
        let code = stream.wait().await?;
        Ok((lines, code))
    })
    .await
    .map_err(|_| {
        crate::errors::EngineError::ConnectionError(format!(
            "probe timed out after {probe_timeout:?}"
        ))
    })?
}

/// Parse a key=value release-info blob for `ID` and `VERSION_ID`.
/// Malformed content yields an undetected identity, never an error.
pub fn parse_os_release(content: &str) -> OsIdentity {
    let mut id = None;
    let mut version = None;

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("ID=") {
            id = Some(value.trim().trim_matches('"').to_string());
        } else if let Some(value) = line.strip_prefix("VERSION_ID=") {
            version = Some(value.trim().trim_matches('"').to_string());
        }
    }

    match id.as_deref().and_then(OsFamily::from_release_id) {
        Some(family) => OsIdentity {
            family: Some(family),
            version,
            raw_id: id,
        },
        None => OsIdentity {
            family: None,
            version: None,
            raw_id: id,
        },
    }
}

fn looks_like_version(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty()
        && line.starts_with(|c: char| c.is_ascii_digit())
        && line.contains('.')
        && line.chars().all(|c| c.is_ascii_digit() || c == '.')
}
