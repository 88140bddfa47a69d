//! Conversion orchestration
//!
//! A run moves through `Extracting`, `ResolvingMetadata`,
//! `AnalyzingDependencies`, `GeneratingSpec` and `Building`, threading one
//! [`BuildContext`] through every stage. Cancellation is observed at stage
//! boundaries and inside the two external tool invocations.

mod context;
mod progress;
mod state;
mod task;

pub use context::{BuildContext, WorkDir};
pub use progress::{ChannelSink, NullSink, ProgressEvent, ProgressSink};
pub use state::{PipelineState, Stage};
pub use task::{ConversionHandle, ConversionTask};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::converter::{PackageBuilder, SpecBuilder};
use crate::deps::{DependencyAnalyzer, DependencyReport};
use crate::error::{ConvertError, Result};
use crate::extractor::{Extractor, InputSource};
use crate::icons::IconResolver;
use crate::metadata::{MetadataOverrides, MetadataResolver};
use crate::models::{Architecture, BuildResult, IconCandidate, Metadata, Warning};
use crate::profiles::{self, ProfileKind};

/// Input and per-run overrides
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    /// AppImage file or AppDir
    pub input: PathBuf,
    /// Name, version, release and license overrides
    pub overrides: MetadataOverrides,
    /// Target distribution, overriding the configuration
    pub profile: Option<String>,
    /// Output directory, overriding the configuration
    pub output_dir: Option<PathBuf>,
    /// Enable or disable dependency detection, overriding the configuration
    pub auto_deps: Option<bool>,
    /// Keep the working directory after the run
    pub keep_temp: bool,
}

impl ConversionRequest {
    /// Request for one input
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    /// Override the package name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.overrides.name = Some(name.into());
        self
    }

    /// Override the version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.overrides.version = Some(version.into());
        self
    }

    /// Override the release
    pub fn release(mut self, release: impl Into<String>) -> Self {
        self.overrides.release = Some(release.into());
        self
    }

    /// Override the license
    pub fn license(mut self, license: impl Into<String>) -> Self {
        self.overrides.license = Some(license.into());
        self
    }

    /// Target distribution profile
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Enable or disable dependency detection
    pub fn auto_deps(mut self, enabled: bool) -> Self {
        self.auto_deps = Some(enabled);
        self
    }

    /// Keep the working directory
    pub fn keep_temp(mut self, keep: bool) -> Self {
        self.keep_temp = keep;
        self
    }
}

/// What `inspect` found, without building anything
#[derive(Debug, Clone, Serialize)]
pub struct InspectionReport {
    /// Input path
    pub input: PathBuf,
    /// Target distribution
    pub profile: ProfileKind,
    /// Resolved metadata
    pub metadata: Metadata,
    /// Desktop file inside the bundle
    pub desktop_file: Option<PathBuf>,
    /// AppStream file inside the bundle
    pub appstream_file: Option<PathBuf>,
    /// Icon candidates, best first
    pub icons: Vec<IconCandidate>,
    /// Dependency analysis
    pub dependencies: DependencyReport,
    /// Non-fatal findings
    pub warnings: Vec<Warning>,
}

impl InspectionReport {
    /// Highest ranked icon
    pub fn selected_icon(&self) -> Option<&IconCandidate> {
        self.icons.first()
    }
}

/// Runs conversions for one configuration
pub struct ConversionPipeline {
    config: Config,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl ConversionPipeline {
    /// Pipeline reporting progress to `sink`
    pub fn new(config: Config, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            config,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this pipeline's runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Convert one input into an RPM
    pub fn run(&self, request: &ConversionRequest) -> Result<BuildResult> {
        let mut state = PipelineState::new();
        let outcome = self.execute(request, &mut state);
        self.finish(&mut state, outcome, |result| {
            format!(
                "Built {}",
                result
                    .artifact()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            )
        })
    }

    /// Extract and analyze an input without building
    pub fn inspect(&self, request: &ConversionRequest) -> Result<InspectionReport> {
        let mut state = PipelineState::inspection();
        let outcome = self.analyze(request, &mut state).and_then(|mut ctx| {
            let resolved = ctx.metadata()?.clone();
            Ok(InspectionReport {
                input: ctx.input().path().to_path_buf(),
                profile: ctx.profile_kind(),
                metadata: resolved.metadata,
                desktop_file: resolved.desktop_file,
                appstream_file: resolved.appstream_file,
                icons: ctx.icons().candidates().to_vec(),
                dependencies: ctx.dependencies().clone(),
                warnings: ctx.take_warnings(),
            })
        });
        self.finish(&mut state, outcome, |_| "Inspection complete".to_string())
    }

    /// Emit the terminal transition. The context is already dropped here.
    fn finish<T>(
        &self,
        state: &mut PipelineState,
        outcome: Result<T>,
        done_message: impl FnOnce(&T) -> String,
    ) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.transition(state, Stage::Done, done_message(&value))?;
                Ok(value)
            }
            Err(err) if err.is_cancelled() => {
                warn!("{}", err);
                self.transition(state, Stage::Cancelled, err.to_string())?;
                Err(err)
            }
            Err(err) => {
                let err = err.at_stage(state.current());
                warn!("{}", err);
                self.transition(state, Stage::Failed, err.to_string())?;
                Err(err)
            }
        }
    }

    fn transition(&self, state: &mut PipelineState, next: Stage, message: String) -> Result<()> {
        state.advance(next)?;
        info!("{}: {}", next, message);
        self.sink.emit(&ProgressEvent::new(next, message));
        Ok(())
    }

    /// Stage boundary: observe cancellation, then enter `next`
    fn checkpoint(&self, state: &mut PipelineState, next: Stage, message: String) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ConvertError::Cancelled {
                stage: state.current(),
            });
        }
        self.transition(state, next, message)
    }

    /// Extracting, ResolvingMetadata, AnalyzingDependencies
    fn analyze(&self, request: &ConversionRequest, state: &mut PipelineState) -> Result<BuildContext> {
        self.checkpoint(
            state,
            Stage::Extracting,
            format!("Extracting {}", request.input.display()),
        )?;
        let input = InputSource::from_path(&request.input)?;
        let profile_kind = profiles::resolve_kind(
            request
                .profile
                .as_deref()
                .or(self.config.conversion.profile.as_deref()),
        )?;
        let output_dir = self.output_dir(request)?;
        let work = WorkDir::create(
            self.config.general.work_dir.as_deref(),
            request.keep_temp || self.config.general.keep_temp,
        )?;
        let mut ctx = BuildContext::new(input, output_dir, profile_kind, work);

        let tree = Extractor::new(self.config.conversion.extract_method)
            .with_cancellation(self.cancel.clone())
            .extract(ctx.input(), ctx.work_path())?;
        ctx.set_tree(tree);

        self.checkpoint(
            state,
            Stage::ResolvingMetadata,
            "Reading desktop entry, AppStream data and icons".to_string(),
        )?;
        let resolved = MetadataResolver::new(&self.config.conversion, profile_kind)?
            .resolve(ctx.tree()?, &request.overrides)?;
        let icons = IconResolver::new().resolve(ctx.tree()?.root(), &resolved.metadata);
        info!(
            "Resolved {} {}",
            resolved.metadata.name,
            resolved.metadata.full_version()
        );
        ctx.set_metadata(resolved);
        ctx.set_icons(icons);

        self.checkpoint(
            state,
            Stage::AnalyzingDependencies,
            format!("Mapping libraries to {} packages", ctx.profile().display_name()),
        )?;
        let report = DependencyAnalyzer::new(ctx.profile(), &self.config)?
            .enabled(request.auto_deps.unwrap_or(self.config.conversion.auto_deps))
            .with_cancellation(self.cancel.clone())
            .analyze(ctx.tree()?.root())?;
        ctx.set_dependencies(report);

        Ok(ctx)
    }

    /// Full run; the context is dropped when this returns
    fn execute(&self, request: &ConversionRequest, state: &mut PipelineState) -> Result<BuildResult> {
        let mut ctx = self.analyze(request, state)?;

        self.checkpoint(
            state,
            Stage::GeneratingSpec,
            "Staging files and generating spec".to_string(),
        )?;
        let build_arch = self.build_arch(ctx.dependencies())?;
        let install_root = ctx.install_root();
        let resolved = ctx.metadata()?;
        let model = SpecBuilder::new(&resolved.metadata, ctx.profile())
            .icon(ctx.icons().selected())
            .desktop_file(resolved.desktop_file.as_deref())
            .dependencies(&ctx.dependencies().dependencies)
            .build_arch(build_arch)
            .stage(ctx.tree()?.root(), &install_root)?;

        self.checkpoint(state, Stage::Building, format!("Running rpmbuild for {}", model.nvr()))?;
        let outcome = PackageBuilder::new(&self.config.build)
            .write_spec(self.config.conversion.write_spec)
            .with_cancellation(self.cancel.clone())
            .build(
                &model,
                &install_root,
                ctx.work_path(),
                ctx.output_dir(),
                ctx.profile(),
            )?;

        Ok(BuildResult::success(
            outcome.artifact,
            outcome.sha256,
            outcome.spec_path,
            outcome.stdout,
            outcome.stderr,
            ctx.take_warnings(),
        ))
    }

    fn output_dir(&self, request: &ConversionRequest) -> Result<PathBuf> {
        match request
            .output_dir
            .as_ref()
            .or(self.config.general.output_dir.as_ref())
        {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Configured override, else the scanned architecture, else the host
    fn build_arch(&self, report: &DependencyReport) -> Result<Architecture> {
        match &self.config.build.build_arch {
            Some(arch) => arch.parse(),
            None => Ok(report.architecture.unwrap_or_else(Architecture::current)),
        }
    }
}

/// Run a conversion with the user configuration and no progress reporting
pub fn convert(input: &Path, output_dir: &Path) -> Result<BuildResult> {
    let config = Config::load()?;
    ConversionPipeline::new(config, Arc::new(NullSink))
        .run(&ConversionRequest::new(input).output_dir(output_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::elf::testing::build_elf;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        appdir: PathBuf,
        work: PathBuf,
        out: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let appdir = temp.path().join("Foo-1.2.3.AppDir");
            fs::create_dir_all(&appdir).unwrap();
            fs::write(
                appdir.join("foo.desktop"),
                "[Desktop Entry]\nType=Application\nName=Foo\nExec=AppRun %U\nIcon=foo\n",
            )
            .unwrap();
            let work = temp.path().join("work");
            let out = temp.path().join("out");
            Self {
                temp,
                appdir,
                work,
                out,
            }
        }

        fn app_run(&self, bytes: &[u8]) {
            let path = self.appdir.join("AppRun");
            fs::write(&path, bytes).unwrap();
            crate::fsutil::set_mode(&path, 0o755).unwrap();
        }

        fn rpmbuild(&self, script: &str) -> String {
            let path = self.temp.path().join("fake-rpmbuild");
            fs::write(&path, script).unwrap();
            crate::fsutil::set_mode(&path, 0o755).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn config(&self, rpmbuild: String) -> Config {
            let mut config = Config::default();
            config.general.work_dir = Some(self.work.clone());
            config.conversion.profile = Some("fedora".into());
            config.conversion.write_spec = true;
            config.build.rpmbuild = rpmbuild;
            config
        }

        fn work_is_empty(&self) -> bool {
            fs::read_dir(&self.work)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(true)
        }
    }

    const FAKE_OK: &str = r#"#!/bin/sh
for a in "$@"; do
  case "$a" in "_topdir "*) top="${a#_topdir }" ;; esac
done
mkdir -p "$top/RPMS/x86_64"
echo rpm > "$top/RPMS/x86_64/foo-1.2.3-1.fc.x86_64.rpm"
"#;

    fn recorder() -> (Arc<Mutex<Vec<Stage>>>, Arc<dyn ProgressSink>) {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = stages.clone();
        let sink: Arc<dyn ProgressSink> =
            Arc::new(move |event: &ProgressEvent| seen.lock().unwrap().push(event.stage));
        (stages, sink)
    }

    #[test]
    fn test_successful_run_reports_unresolved_soname() {
        let fixture = Fixture::new();
        fixture.app_run(&build_elf(62, &["libc.so.6", "libmystery.so.9"], None, false));
        let config = fixture.config(fixture.rpmbuild(FAKE_OK));
        let (stages, sink) = recorder();

        let result = ConversionPipeline::new(config, sink)
            .run(&ConversionRequest::new(&fixture.appdir).output_dir(&fixture.out))
            .unwrap();

        assert!(result.is_success());
        assert_eq!(
            result.artifact().unwrap(),
            fixture.out.join("foo-1.2.3-1.fc.x86_64.rpm")
        );
        assert!(result.warnings().contains(&Warning::Dependency {
            soname: "libmystery.so.9".into()
        }));
        assert!(result
            .warnings()
            .iter()
            .any(|w| matches!(w, Warning::Icon(_))));

        let spec = fs::read_to_string(result.spec_path().unwrap()).unwrap();
        assert!(spec.contains("Name:           foo\n"));
        assert!(spec.contains("Version:        1.2.3\n"));
        assert!(spec.contains("Requires:       glibc\n"));
        assert!(spec.contains("BuildArch:      x86_64\n"));
        assert!(!spec.contains("libmystery"));

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                Stage::Extracting,
                Stage::ResolvingMetadata,
                Stage::AnalyzingDependencies,
                Stage::GeneratingSpec,
                Stage::Building,
                Stage::Done,
            ]
        );
        assert!(fixture.work_is_empty());
    }

    #[test]
    fn test_cancel_between_stages_removes_work_dir() {
        let fixture = Fixture::new();
        fixture.app_run(b"#!/bin/sh\n");
        let config = fixture.config(fixture.rpmbuild(FAKE_OK));

        let cancel = CancellationToken::new();
        let stages = Arc::new(Mutex::new(Vec::new()));
        let (seen, token) = (stages.clone(), cancel.clone());
        let sink: Arc<dyn ProgressSink> = Arc::new(move |event: &ProgressEvent| {
            seen.lock().unwrap().push(event.stage);
            if event.stage == Stage::ResolvingMetadata {
                token.cancel();
            }
        });

        let err = ConversionPipeline::new(config, sink)
            .with_cancellation(cancel)
            .run(&ConversionRequest::new(&fixture.appdir))
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.stage(), Some(Stage::ResolvingMetadata));
        assert_eq!(stages.lock().unwrap().last(), Some(&Stage::Cancelled));
        assert!(fixture.work_is_empty());
        assert!(!fixture.out.exists());
    }

    #[test]
    fn test_build_failure_keeps_output_and_cleans_up() {
        let fixture = Fixture::new();
        fixture.app_run(b"#!/bin/sh\n");
        let config = fixture.config(
            fixture.rpmbuild("#!/bin/sh\necho 'error: Bad exit status from /var/tmp/rpm-tmp' >&2\nexit 1\n"),
        );
        let (stages, sink) = recorder();

        let err = ConversionPipeline::new(config, sink)
            .run(&ConversionRequest::new(&fixture.appdir).output_dir(&fixture.out))
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Building));
        assert!(matches!(err.root(), ConvertError::Build { .. }));
        assert!(err.build_output().unwrap().contains("Bad exit status"));
        assert_eq!(stages.lock().unwrap().last(), Some(&Stage::Failed));
        assert!(fixture.work_is_empty());
        let produced = fs::read_dir(&fixture.out).map(|d| d.count()).unwrap_or(0);
        assert_eq!(produced, 0);
    }

    #[test]
    fn test_missing_executable_fails_in_spec_stage() {
        let fixture = Fixture::new();
        fs::write(
            fixture.appdir.join("foo.desktop"),
            "[Desktop Entry]\nName=Foo\nExec=nothing-here\n",
        )
        .unwrap();
        let config = fixture.config(fixture.rpmbuild(FAKE_OK));

        let err = ConversionPipeline::new(config, Arc::new(NullSink))
            .run(&ConversionRequest::new(&fixture.appdir))
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::GeneratingSpec));
        assert!(matches!(err.root(), ConvertError::SpecGeneration(_)));
    }

    #[test]
    fn test_inspect_stops_before_building() {
        let fixture = Fixture::new();
        fixture.app_run(&build_elf(62, &["libz.so.1"], None, false));
        fs::write(fixture.appdir.join("foo.svg"), "<svg/>").unwrap();
        let config = fixture.config("unused".into());
        let (stages, sink) = recorder();

        let report = ConversionPipeline::new(config, sink)
            .inspect(&ConversionRequest::new(&fixture.appdir).auto_deps(true))
            .unwrap();

        assert_eq!(report.metadata.name, "foo");
        assert_eq!(report.profile, ProfileKind::Fedora);
        assert!(report.selected_icon().is_some());
        assert_eq!(report.dependencies.requires(), vec!["zlib"]);
        assert_eq!(stages.lock().unwrap().last(), Some(&Stage::Done));
        assert!(!stages.lock().unwrap().contains(&Stage::Building));
        assert!(fixture.work_is_empty());
    }

    #[test]
    fn test_extraction_failure_is_stage_tagged_and_cleaned_up() {
        let fixture = Fixture::new();
        let image = fixture.temp.path().join("Foo-1.2.3-x86_64.AppImage");
        let mut header = vec![0u8; 64];
        header[..4].copy_from_slice(b"\x7fELF");
        header[4] = 2;
        header[5] = 1;
        header[8..11].copy_from_slice(b"AI\x02");
        fs::write(&image, header).unwrap();

        let mut config = fixture.config("unused".into());
        config.conversion.extract_method = crate::config::ExtractMethod::Runtime;
        let (stages, sink) = recorder();

        let err = ConversionPipeline::new(config, sink)
            .run(&ConversionRequest::new(&image))
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Extracting));
        assert!(matches!(err.root(), ConvertError::Extraction(_)));
        assert!(err.is_fatal_kind());
        assert_eq!(stages.lock().unwrap().last(), Some(&Stage::Failed));
        assert!(fixture.work_is_empty());
    }

    #[test]
    fn test_missing_input_fails_while_extracting() {
        let fixture = Fixture::new();
        let config = fixture.config("unused".into());
        let err = ConversionPipeline::new(config, Arc::new(NullSink))
            .run(&ConversionRequest::new(fixture.temp.path().join("nope.AppImage")))
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Extracting));
        assert!(matches!(err.root(), ConvertError::FileNotFound { .. }));
    }
}
