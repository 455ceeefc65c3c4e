//! Update command catalog
//!
//! Pure mapping from (OS family, update mode) to a runnable command. No
//! I/O, no state. The repo-only variants carry the package manager's
//! config-preserving flag where one exists; that flag is a behavioral
//! contract, not an incidental detail.

use crate::errors::EngineError;
use crate::osdetect::OsFamily;

/// A resolved update command with its human-readable description.
#[derive(Debug, Clone)]
pub struct UpdateCommand {
    pub command: String,
    pub description: &'static str,
}

const DESC_REPO: &str = "Repository-only update (preserving config files)";
const DESC_FULL: &str = "Full system update";

/// Resolve the update command for a supported family. Exhaustive over
/// [`OsFamily`]; adding a family without a catalog entry is a compile
/// error.
pub fn resolve(family: OsFamily, repo_only: bool) -> UpdateCommand {
    let command = match (family, repo_only) {
        (OsFamily::Ubuntu | OsFamily::Debian, true) => {
            "sudo DEBIAN_FRONTEND=noninteractive apt-get update && \
             sudo DEBIAN_FRONTEND=noninteractive apt-get upgrade -y -o Dpkg::Options::='--force-confold'"
                .to_string()
        }
        (OsFamily::Ubuntu | OsFamily::Debian, false) => {
            "sudo DEBIAN_FRONTEND=noninteractive apt-get update && \
             sudo DEBIAN_FRONTEND=noninteractive apt-get upgrade -y && \
             sudo DEBIAN_FRONTEND=noninteractive apt-get dist-upgrade -y"
                .to_string()
        }
        (OsFamily::Fedora, true) => "sudo dnf upgrade -y --setopt=tsflags=noscripts".to_string(),
        (OsFamily::Fedora, false) => "sudo dnf upgrade -y".to_string(),
        (OsFamily::CentOs, true) => "sudo yum update -y --setopt=tsflags=noscripts".to_string(),
        (OsFamily::CentOs, false) => "sudo yum update -y".to_string(),
        (OsFamily::Arch, true) => "sudo pacman -Syu --noconfirm --needed".to_string(),
        (OsFamily::Arch, false) => "sudo pacman -Syu --noconfirm".to_string(),
        (OsFamily::Windows, true) => {
            "powershell -NoProfile -NonInteractive -Command \
             \"Import-Module PSWindowsUpdate; Get-WindowsUpdate -AcceptAll -Install -IgnoreReboot\""
                .to_string()
        }
        (OsFamily::Windows, false) => {
            "powershell -NoProfile -NonInteractive -Command \
             \"Import-Module PSWindowsUpdate; Get-WindowsUpdate -AcceptAll -Install -IgnoreReboot\" && \
             winget upgrade --all --silent --accept-source-agreements --accept-package-agreements"
                .to_string()
        }
    };

    let description = if repo_only { DESC_REPO } else { DESC_FULL };

    UpdateCommand {
        command,
        description,
    }
}

/// Resolve from a raw release identifier. Fails with `UnsupportedTarget`
/// when the identifier is not in the closed supported set.
pub fn resolve_id(id: &str, repo_only: bool) -> Result<UpdateCommand, EngineError> {
    OsFamily::from_release_id(id)
        .map(|family| resolve(family, repo_only))
        .ok_or_else(|| {
            EngineError::UnsupportedTarget(format!(
                "unsupported OS family '{id}' (supported: ubuntu, debian, fedora, centos, arch, windows)"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_FAMILIES: &[(OsFamily, &str)] = &[
        (OsFamily::Ubuntu, "apt-get"),
        (OsFamily::Debian, "apt-get"),
        (OsFamily::Fedora, "dnf"),
        (OsFamily::CentOs, "yum"),
        (OsFamily::Arch, "pacman"),
    ];

    #[test]
    fn test_every_linux_family_uses_its_package_manager() {
        for &(family, manager) in LINUX_FAMILIES {
            for repo_only in [true, false] {
                let update = resolve(family, repo_only);
                assert!(
                    update.command.contains(manager),
                    "{family} ({repo_only}) should invoke {manager}: {}",
                    update.command
                );
            }
        }
    }

    #[test]
    fn test_repo_only_carries_config_preserving_flag() {
        let flags = [
            (OsFamily::Ubuntu, "--force-confold"),
            (OsFamily::Debian, "--force-confold"),
            (OsFamily::Fedora, "tsflags=noscripts"),
            (OsFamily::CentOs, "tsflags=noscripts"),
            (OsFamily::Arch, "--needed"),
        ];
        for (family, flag) in flags {
            let repo = resolve(family, true);
            assert!(
                repo.command.contains(flag),
                "{family} repo-only should carry {flag}: {}",
                repo.command
            );
            let full = resolve(family, false);
            assert!(
                !full.command.contains(flag),
                "{family} full update should not carry {flag}: {}",
                full.command
            );
        }
    }

    #[test]
    fn test_full_debian_update_includes_dist_upgrade() {
        let update = resolve(OsFamily::Debian, false);
        assert!(update.command.contains("dist-upgrade"));
        let repo = resolve(OsFamily::Debian, true);
        assert!(!repo.command.contains("dist-upgrade"));
    }

    #[test]
    fn test_windows_repo_only_skips_winget() {
        let update = resolve(OsFamily::Windows, true);
        assert!(update.command.to_lowercase().contains("powershell"));
        assert!(update.command.contains("Get-WindowsUpdate"));
        assert!(!update.command.contains("winget"));
    }

    #[test]
    fn test_windows_full_update_includes_winget() {
        let update = resolve(OsFamily::Windows, false);
        assert!(update.command.to_lowercase().contains("powershell"));
        assert!(update.command.contains("Get-WindowsUpdate"));
        assert!(update.command.contains("winget upgrade"));
    }

    #[test]
    fn test_descriptions_track_mode() {
        assert_eq!(resolve(OsFamily::Fedora, true).description, DESC_REPO);
        assert_eq!(resolve(OsFamily::Fedora, false).description, DESC_FULL);
    }

    #[test]
    fn test_resolve_id_known_and_unknown() {
        assert!(resolve_id("ubuntu", false).is_ok());
        assert!(resolve_id("\"centos\"", true).is_ok());

        let err = resolve_id("unknown_family", false).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedTarget(_)));
    }
}
