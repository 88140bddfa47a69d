//! Shared library dependency analysis
//!
//! Every ELF file in the extracted tree is scanned for `DT_NEEDED` entries.
//! Sonames the bundle ships itself are dropped; the rest are mapped to
//! distribution packages through the user table, the profile table and,
//! when enabled, a `dnf repoquery` lookup.

pub mod elf;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::models::{Architecture, Dependency, MappingSource, PackageRef, Warning};
use crate::process::{ToolCommand, ToolRun};
use crate::profiles::DistroProfile;

use self::elf::{has_elf_magic, read_elf_info, ElfInfo};

const REPOQUERY_TIMEOUT: Duration = Duration::from_secs(60);

lazy_static::lazy_static! {
    static ref LIBRARY_NAME_RE: Regex =
        Regex::new(r"^(?:lib|ld-)[^/]*\.so(?:\.\d+)*$").unwrap();
}

/// Raw scan result, before any package mapping
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Union of all `DT_NEEDED` entries, sorted
    pub needed: BTreeSet<String>,
    /// Sonames and library file names shipped in the tree
    pub provided: BTreeSet<String>,
    /// Number of ELF files inspected
    pub elf_files: usize,
    /// Architecture of the payload executables
    pub architecture: Option<Architecture>,
}

impl ScanResult {
    /// Needed sonames not shipped by the bundle, sorted
    pub fn external(&self) -> impl Iterator<Item = &String> {
        self.needed.iter().filter(|s| !self.provided.contains(*s))
    }

    /// Needed sonames the bundle ships itself, sorted
    pub fn bundled(&self) -> impl Iterator<Item = &String> {
        self.needed.iter().filter(|s| self.provided.contains(*s))
    }
}

/// Outcome of dependency analysis
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyReport {
    /// One entry per external soname, sorted by soname
    pub dependencies: Vec<Dependency>,
    /// Sonames satisfied by the bundle
    pub bundled: Vec<String>,
    /// Payload architecture, when any executable was found
    pub architecture: Option<Architecture>,
    /// Number of ELF files inspected
    pub elf_files: usize,
    /// One warning per unresolved soname
    pub warnings: Vec<Warning>,
}

impl DependencyReport {
    /// Deduplicated `Requires:` values, in soname order
    pub fn requires(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.dependencies
            .iter()
            .filter_map(Dependency::to_requires)
            .filter(|r| seen.insert(r.clone()))
            .collect()
    }

    /// Sonames no source could map
    pub fn unresolved(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| !d.is_resolved())
    }
}

/// Maps the bundle's library requirements to distribution packages
pub struct DependencyAnalyzer<'a> {
    profile: &'a dyn DistroProfile,
    mappings: BTreeMap<String, PackageRef>,
    enabled: bool,
    query_package_manager: bool,
    cancel: CancellationToken,
}

impl<'a> DependencyAnalyzer<'a> {
    /// Create an analyzer for a profile; user mappings are validated here
    pub fn new(profile: &'a dyn DistroProfile, config: &Config) -> Result<Self> {
        let mappings = config
            .mappings
            .iter()
            .map(|(soname, package)| Ok((soname.clone(), PackageRef::parse(package)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            profile,
            mappings,
            enabled: config.conversion.auto_deps,
            query_package_manager: config.conversion.query_package_manager,
            cancel: CancellationToken::new(),
        })
    }

    /// Enable or disable the scan
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Stop package manager queries when this token fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Scan `root` and resolve every external soname
    pub fn analyze(&self, root: &Path) -> Result<DependencyReport> {
        if !self.enabled {
            info!("Automatic dependency detection disabled");
            return Ok(DependencyReport::default());
        }

        let scan = scan_tree(root)?;
        let bundled: Vec<String> = scan.bundled().cloned().collect();
        info!(
            "Scanned {} ELF files: {} sonames needed, {} bundled",
            scan.elf_files,
            scan.needed.len(),
            bundled.len()
        );

        let arch = scan.architecture.unwrap_or_default();
        let mut dependencies = Vec::new();
        let mut warnings = Vec::new();

        for soname in scan.external() {
            let mut dependency = Dependency::new(soname.clone());
            match self.resolve(soname, arch) {
                Some((package, source)) => {
                    debug!("{} -> {} ({:?})", soname, package, source);
                    dependency.resolve(package, source);
                }
                None => {
                    warn!("No package provides {}", soname);
                    warnings.push(Warning::Dependency {
                        soname: soname.clone(),
                    });
                }
            }
            dependencies.push(dependency);
        }

        Ok(DependencyReport {
            dependencies,
            bundled,
            architecture: scan.architecture,
            elf_files: scan.elf_files,
            warnings,
        })
    }

    /// User mappings, then the profile table, then the package manager
    fn resolve(&self, soname: &str, arch: Architecture) -> Option<(PackageRef, MappingSource)> {
        if let Some(package) = self.mappings.get(soname) {
            return Some((package.clone(), MappingSource::User));
        }
        if let Some(package) = self.profile.lookup(soname) {
            return Some((package, MappingSource::Builtin));
        }
        if self.query_package_manager && !self.cancel.is_cancelled() {
            return query_dnf(soname, arch, &self.cancel)
                .map(|name| (PackageRef::new(name), MappingSource::PackageManager));
        }
        None
    }
}

/// Scan every regular file of the tree in parallel
pub fn scan_tree(root: &Path) -> Result<ScanResult> {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut provided = BTreeSet::new();

    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if LIBRARY_NAME_RE.is_match(&name) {
            // Symlinked or not, a file with this name satisfies the loader
            provided.insert(name);
        }
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let infos: Vec<ElfInfo> = files
        .par_iter()
        .filter(|path| has_elf_magic(path))
        .filter_map(|path| match read_elf_info(path) {
            Ok(info) => info,
            Err(err) => {
                debug!("Skipping {}: {}", path.display(), err);
                None
            }
        })
        .collect();

    let mut needed = BTreeSet::new();
    let mut machines: BTreeMap<u16, usize> = BTreeMap::new();
    let mut library_machines: BTreeMap<u16, usize> = BTreeMap::new();

    for info in &infos {
        needed.extend(info.needed.iter().cloned());
        if let Some(soname) = &info.soname {
            provided.insert(soname.clone());
        }
        let counter = if info.has_interpreter {
            &mut machines
        } else {
            &mut library_machines
        };
        *counter.entry(info.machine).or_default() += 1;
    }

    let architecture = most_common(&machines)
        .or_else(|| most_common(&library_machines))
        .and_then(Architecture::from_elf_machine);

    Ok(ScanResult {
        needed,
        provided,
        elf_files: infos.len(),
        architecture,
    })
}

fn most_common(counts: &BTreeMap<u16, usize>) -> Option<u16> {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(machine, _)| *machine)
}

/// `dnf repoquery --whatprovides` for one soname
fn query_dnf(soname: &str, arch: Architecture, cancel: &CancellationToken) -> Option<String> {
    let dnf = which::which("dnf").ok()?;
    let capability = format!("{}{}", soname, arch.lib_provides_suffix());

    let run = ToolCommand::new(dnf)
        .args(["repoquery", "--quiet", "--qf", "%{name}\n", "--whatprovides"])
        .arg(&capability)
        .timeout(Some(REPOQUERY_TIMEOUT))
        .run(cancel);

    match run {
        Ok(ToolRun::Finished(output)) if output.success() => {
            let name = output
                .stdout
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string);
            debug!("dnf: {} -> {:?}", capability, name);
            name
        }
        Ok(_) => None,
        Err(err) => {
            debug!("dnf repoquery failed: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::elf::testing::build_elf;
    use super::*;
    use crate::profiles::{profile_for, ProfileKind};
    use std::fs;
    use tempfile::TempDir;

    const EM_X86_64: u16 = 62;
    const EM_AARCH64: u16 = 183;

    fn write(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn sample_tree(root: &Path) {
        write(
            root,
            "usr/bin/foo",
            &build_elf(EM_X86_64, &["libgtk-3.so.0", "libfoo.so.1", "libc.so.6"], None, false),
        );
        write(
            root,
            "usr/lib/libfoo.so.1",
            &build_elf(EM_X86_64, &["libz.so.1", "libc.so.6", "libmystery.so.7"], Some("libfoo.so.1"), true),
        );
        write(root, "usr/share/doc/README", b"not elf");
    }

    #[test]
    fn test_scan_is_sorted_and_deduplicated() {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());

        let scan = scan_tree(temp.path()).unwrap();
        let needed: Vec<_> = scan.needed.iter().cloned().collect();
        assert_eq!(
            needed,
            vec!["libc.so.6", "libfoo.so.1", "libgtk-3.so.0", "libmystery.so.7", "libz.so.1"]
        );
        assert_eq!(scan.bundled().cloned().collect::<Vec<_>>(), vec!["libfoo.so.1"]);
        assert_eq!(scan.elf_files, 2);
    }

    #[test]
    fn test_only_library_file_names_count_as_bundled() {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());
        write(temp.path(), "resources/libz.so.1.txt", b"notes");
        write(temp.path(), "resources/foo.so.txt", b"notes");
        write(temp.path(), "plugins/libgtk-3.so.0.bak", b"old");
        write(temp.path(), "usr/lib/ld-linux-x86-64.so.2", b"loader");
        write(temp.path(), "usr/lib/libmystery.so", b"dev symlink target");

        let scan = scan_tree(temp.path()).unwrap();
        assert!(!scan.provided.contains("libz.so.1.txt"));
        assert!(!scan.provided.contains("foo.so.txt"));
        assert!(!scan.provided.contains("libgtk-3.so.0.bak"));
        assert!(scan.provided.contains("ld-linux-x86-64.so.2"));
        assert!(scan.provided.contains("libmystery.so"));
        assert_eq!(scan.bundled().cloned().collect::<Vec<_>>(), vec!["libfoo.so.1"]);
    }

    #[test]
    fn test_scan_is_deterministic() {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());
        let first = scan_tree(temp.path()).unwrap();
        for _ in 0..5 {
            assert_eq!(scan_tree(temp.path()).unwrap().needed, first.needed);
        }
    }

    #[test]
    fn test_resolution_and_unresolved_warning() {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());

        let profile = profile_for(ProfileKind::Fedora);
        let mut config = Config::default();
        config
            .mappings
            .insert("libz.so.1".into(), "zlib-ng-compat >= 2.0".into());

        let report = DependencyAnalyzer::new(profile.as_ref(), &config)
            .unwrap()
            .analyze(temp.path())
            .unwrap();

        let by_soname: BTreeMap<_, _> = report
            .dependencies
            .iter()
            .map(|d| (d.soname.as_str(), d))
            .collect();
        assert_eq!(by_soname.len(), 4);
        assert!(!by_soname.contains_key("libfoo.so.1"));
        assert_eq!(by_soname["libc.so.6"].package.as_deref(), Some("glibc"));
        assert_eq!(by_soname["libz.so.1"].source, Some(MappingSource::User));
        assert!(!by_soname["libmystery.so.7"].is_resolved());

        assert_eq!(
            report.warnings,
            vec![Warning::Dependency {
                soname: "libmystery.so.7".into()
            }]
        );
        assert_eq!(
            report.requires(),
            vec!["glibc", "gtk3", "zlib-ng-compat >= 2.0"]
        );
        assert_eq!(report.architecture, Some(Architecture::X86_64));
        assert_eq!(report.bundled, vec!["libfoo.so.1"]);
    }

    #[test]
    fn test_disabled_is_noop() {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());

        let profile = profile_for(ProfileKind::Fedora);
        let report = DependencyAnalyzer::new(profile.as_ref(), &Config::default())
            .unwrap()
            .enabled(false)
            .analyze(temp.path())
            .unwrap();
        assert!(report.dependencies.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_invalid_user_mapping_is_rejected() {
        let profile = profile_for(ProfileKind::Fedora);
        let mut config = Config::default();
        config.mappings.insert("libz.so.1".into(), "not a package ref".into());
        assert!(DependencyAnalyzer::new(profile.as_ref(), &config).is_err());
    }

    #[test]
    fn test_architecture_follows_majority() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.so", &build_elf(EM_X86_64, &[], Some("a.so"), true));
        write(temp.path(), "b.so", &build_elf(EM_X86_64, &[], Some("b.so"), true));
        write(temp.path(), "app", &build_elf(EM_AARCH64, &[], None, false));

        let scan = scan_tree(temp.path()).unwrap();
        assert_eq!(scan.architecture, Some(Architecture::X86_64));
    }
}
