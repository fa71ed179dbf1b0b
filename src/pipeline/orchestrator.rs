// Job Orchestrator
//
// One spawned task per job. Stages run strictly in order over the job's
// staging workspace; the first failure skips to finalize, which always
// cleans up and always delivers exactly one result payload.

use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::error::{PipelineError, PipelineResult};
use super::job::Job;
use super::publish::{copy_atomically, jittered_now, publish, remove_idsig_files, set_mtime, temp_path, PublicLayout};
use super::result::{JobOutcome, ResultPayload};
use super::transform::{apply_transforms, TransformOptions, TransformReport};
use super::workspace::StagingWorkspace;
use crate::config::HardenConfig;
use crate::keystore::{IdentityStore, KeytoolGenerator, SigningSubject};
use crate::notify::NotificationSink;
use crate::tools::{
    Aligner, ApkSigner, ApkTool, Assembler, CurlRetriever, Disassembler, Retriever, SigningTools, ToolError,
    ToolRunner,
};

/// The external capabilities a pipeline run needs
#[derive(Clone)]
pub struct PipelineTools {
    pub retriever: Arc<dyn Retriever>,
    pub disassembler: Arc<dyn Disassembler>,
    pub assembler: Arc<dyn Assembler>,
    pub aligner: Arc<dyn Aligner>,
    pub signer: Arc<dyn ApkSigner>,
}

impl PipelineTools {
    /// Real tool adapters sharing one runner, each with its configured
    /// per-call timeout
    pub fn from_config(config: &HardenConfig, runner: Arc<dyn ToolRunner>) -> Self {
        let tools = &config.tools;
        let timeouts = &config.timeouts;
        let apktool = |timeout| ApkTool::new(runner.clone(), tools.java.clone(), tools.apktool_jar.clone(), timeout);
        let signing = |timeout| {
            SigningTools::new(
                runner.clone(),
                tools.zipalign.clone(),
                tools.apksigner.clone(),
                tools.signer_is_jar,
                tools.java.clone(),
                timeout,
            )
        };

        Self {
            retriever: Arc::new(CurlRetriever::new(runner.clone(), tools.curl.clone(), timeouts.fetch())),
            disassembler: Arc::new(apktool(timeouts.unpack())),
            assembler: Arc::new(apktool(timeouts.repack())),
            aligner: Arc::new(signing(timeouts.align())),
            signer: Arc::new(signing(timeouts.sign())),
        }
    }
}

/// Identity store for `config`, generating keys with keytool through `runner`
pub fn identity_store_from_config(config: &HardenConfig, runner: Arc<dyn ToolRunner>) -> IdentityStore {
    let generator = KeytoolGenerator::new(runner, config.tools.keytool.clone(), config.timeouts.keygen());
    IdentityStore::new(
        config.paths.keystores_dir(),
        Arc::new(config.signing.key_derivation),
        Arc::new(generator),
    )
}

struct Inner {
    jobs_dir: PathBuf,
    layout: PublicLayout,
    transform: TransformOptions,
    tools: PipelineTools,
    identities: IdentityStore,
    notifier: Arc<dyn NotificationSink>,
    admission: Option<Arc<Semaphore>>,
}

/// Runs hardening jobs. Cheap to clone; clones share tools and admission.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        config: &HardenConfig,
        tools: PipelineTools,
        identities: IdentityStore,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let admission = config
            .pipeline
            .max_concurrent_jobs
            .filter(|limit| *limit > 0)
            .map(|limit| Arc::new(Semaphore::new(limit)));

        Self {
            inner: Arc::new(Inner {
                jobs_dir: config.paths.jobs_dir.clone(),
                layout: PublicLayout::new(config.paths.output_dir.clone(), config.public_base_url()),
                transform: TransformOptions {
                    protection_stub: config.injection.protection_stub,
                    launch_reporter: config.injection.launch_reporter(),
                    camouflage: config.injection.camouflage,
                },
                tools,
                identities,
                notifier,
                admission,
            }),
        }
    }

    /// Orchestrator with real external tools run through `runner`
    pub fn from_config(
        config: &HardenConfig,
        runner: Arc<dyn ToolRunner>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let tools = PipelineTools::from_config(config, runner.clone());
        let identities = identity_store_from_config(config, runner);
        Self::new(config, tools, identities, notifier)
    }

    pub fn layout(&self) -> &PublicLayout {
        &self.inner.layout
    }

    /// Start `job` in the background and return its id immediately
    pub fn submit(&self, job: Job) -> Uuid {
        let job_id = job.job_id();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.execute(job).await;
        });
        log::info!("[job {}] accepted", job_id);
        job_id
    }

    /// Run `job` to completion, deliver its payload and return it
    pub async fn execute(&self, job: Job) -> ResultPayload {
        let job_id = job.job_id();
        let _permit = match &self.inner.admission {
            Some(admission) => {
                log::debug!("[job {}] waiting for a pipeline slot", job_id);
                admission.clone().acquire_owned().await.ok()
            }
            None => None,
        };
        log::info!("[job {}] started for {}", job_id, job.apk_url());

        let public_dir = self.inner.layout.public_dir(job.domain());
        let temp = temp_path(&public_dir, job.file_name(), &mut rand::thread_rng());

        let (workspace, outcome) = match StagingWorkspace::create(&self.inner.jobs_dir, job_id).await {
            Ok(workspace) => {
                let outcome = AssertUnwindSafe(self.run(&job, &workspace, &public_dir, &temp))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(panic))));
                (Some(workspace), outcome)
            }
            Err(source) => (
                None,
                Err(PipelineError::Io {
                    context: "failed to create staging workspace".to_string(),
                    source,
                }),
            ),
        };

        self.finalize(&job, workspace, &temp, outcome).await
    }

    async fn run(
        &self,
        job: &Job,
        workspace: &StagingWorkspace,
        public_dir: &Path,
        temp: &Path,
    ) -> PipelineResult<JobOutcome> {
        let job_id = job.job_id();
        let tools = &self.inner.tools;

        let source_apk = workspace.source_apk();
        let size = tools
            .retriever
            .retrieve(job.apk_url(), &source_apk)
            .await
            .map_err(PipelineError::Fetch)?;
        log::info!("[job {}] fetched {} bytes", job_id, size);

        let src_dir = workspace.src_dir();
        tools
            .disassembler
            .disassemble(&source_apk, &src_dir)
            .await
            .map_err(PipelineError::Unpack)?;
        log::info!("[job {}] decoded into {}", job_id, src_dir.display());

        let report = self.transform(job, src_dir.clone()).await?;

        let rebuilt = workspace.rebuilt_apk();
        tools
            .assembler
            .assemble(&src_dir, &rebuilt)
            .await
            .map_err(PipelineError::Repack)?;
        log::info!("[job {}] rebuilt {}", job_id, rebuilt.display());

        let unsigned = workspace.unsigned_apk();
        let aligned = workspace.aligned_apk();
        tokio::fs::copy(&rebuilt, &unsigned)
            .await
            .map_err(|e| PipelineError::Align(ToolError::Io(e)))?;
        tools.aligner.align(&unsigned, &aligned).await.map_err(PipelineError::Align)?;

        let subject = SigningSubject {
            package: &report.new_package,
            file_name: job.file_name(),
            correlation_id: job.id(),
        };
        let credential = self.inner.identities.credential_for(&subject).await?;

        tokio::fs::create_dir_all(public_dir)
            .await
            .map_err(|source| PipelineError::Publish {
                path: public_dir.to_path_buf(),
                source,
            })?;
        tools
            .signer
            .sign(&aligned, temp, &credential)
            .await
            .map_err(PipelineError::Sign)?;

        let apk_name = format!("{}.apk", job.file_name());
        let final_apk = public_dir.join(&apk_name);
        publish(temp, &final_apk)
            .await
            .map_err(|source| PipelineError::Publish {
                path: final_apk.clone(),
                source,
            })?;
        log::info!("[job {}] published {}", job_id, final_apk.display());

        // Nothing below may fail the job: the archive is already public.
        Ok(self
            .publish_auxiliaries(job, report, public_dir, &credential.path, final_apk, &apk_name)
            .await)
    }

    async fn transform(&self, job: &Job, src_dir: PathBuf) -> PipelineResult<TransformReport> {
        let job = job.clone();
        let options = self.inner.transform.clone();
        tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::from_entropy();
            apply_transforms(&src_dir, &job, &options, &mut rng)
        })
        .await
        .map_err(|e| PipelineError::Panicked(e.to_string()))?
    }

    async fn publish_auxiliaries(
        &self,
        job: &Job,
        report: TransformReport,
        public_dir: &Path,
        keystore: &Path,
        final_apk: PathBuf,
        apk_name: &str,
    ) -> JobOutcome {
        let job_id = job.job_id();
        let layout = &self.inner.layout;
        let mut summary = report.summary;

        let icon_name = format!("{}.png", job.file_name());
        let icon_path = public_dir.join(&icon_name);
        let icon_published = match &report.icon {
            Some(icon) => match copy_atomically(icon, &icon_path).await {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("[job {}] icon not published: {}", job_id, e);
                    false
                }
            },
            None => false,
        };
        summary.icon_extracted = icon_published;

        let keystore_name = format!("{}_{}.keystore", job.file_name(), job.id());
        let keystore_url = match copy_atomically(keystore, &public_dir.join(&keystore_name)).await {
            Ok(()) => Some(layout.locator(&keystore_name)),
            Err(e) => {
                log::warn!("[job {}] keystore copy not published: {}", job_id, e);
                None
            }
        };

        summary.idsig_files_removed = remove_idsig_files(public_dir, job.file_name());

        let when = jittered_now(&mut rand::thread_rng());
        let mut touched: Vec<&Path> = vec![final_apk.as_path()];
        if icon_published {
            touched.push(icon_path.as_path());
        }
        set_mtime(&touched, when);

        JobOutcome {
            download_url: layout.locator(apk_name),
            public_path: final_apk,
            file_name: apk_name.to_string(),
            original_package: report.original.package,
            new_package: report.new_package,
            old_version_code: report.version.old_code,
            new_version_code: report.version.new_code,
            old_version_name: report.version.old_name,
            new_version_name: report.version.new_name,
            old_display_name: report.display_name.old_name,
            new_display_name: report.display_name.new_name,
            icon_url: icon_published.then(|| layout.locator(&icon_name)),
            keystore_url,
            summary,
        }
    }

    async fn finalize(
        &self,
        job: &Job,
        workspace: Option<StagingWorkspace>,
        temp: &Path,
        outcome: PipelineResult<JobOutcome>,
    ) -> ResultPayload {
        let job_id = job.job_id();

        if let Some(workspace) = workspace {
            if workspace.remove().await {
                log::debug!("[job {}] workspace removed", job_id);
            }
        }
        match tokio::fs::remove_file(temp).await {
            Ok(()) => log::debug!("[job {}] removed stray {}", job_id, temp.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("[job {}] cannot remove {}: {}", job_id, temp.display(), e),
        }

        let payload = match outcome {
            Ok(outcome) => {
                log::info!("[job {}] succeeded: {}", job_id, outcome.download_url);
                ResultPayload::succeeded(job, outcome)
            }
            Err(error) => {
                log::error!("[job {}] failed ({}): {}", job_id, error.kind(), error);
                ResultPayload::failed(job, &error)
            }
        };

        match self.inner.notifier.deliver(job.callback_url(), &payload).await {
            Ok(()) => log::info!("[job {}] result delivered to {}", job_id, job.callback_url()),
            Err(e) => log::warn!("[job {}] result delivery failed: {}", job_id, e),
        }
        payload
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
