// Shared fixtures: an in-process toolchain and a capturing notification sink

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use apk_harden::config::HardenConfig;
use apk_harden::notify::{NotificationSink, NotifyResult};
use apk_harden::pipeline::{JobRequest, Orchestrator, ResultPayload};
use apk_harden::tools::{ToolCommand, ToolError, ToolOutput, ToolResult, ToolRunner};

pub const OLD_PACKAGE: &str = "com.example.shop";
pub const OLD_LABEL: &str = "Shop Classic";

pub const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="no"?><manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.shop" android:versionCode="12" android:versionName="3.4.1">
    <uses-permission android:name="android.permission.INTERNET"/>
    <uses-permission android:name="android.permission.READ_CONTACTS"/>
    <uses-permission android:name="android.permission.CAMERA"/>
    <application android:label="@string/app_name" android:icon="@mipmap/ic_launcher" android:debuggable="true" android:allowBackup="true">
        <activity android:name=".MainActivity" android:label="Shop Classic" android:exported="true">
            <intent-filter>
                <action android:name="android.intent.action.MAIN"/>
                <category android:name="android.intent.category.LAUNCHER"/>
            </intent-filter>
        </activity>
        <activity android:name="com.example.shop.util.SettingsActivity"/>
        <provider android:name="androidx.startup.InitializationProvider" android:authorities="com.example.shop.androidx-startup"/>
    </application>
</manifest>"#;

const MAIN_ACTIVITY: &str = ".class public Lcom/example/shop/MainActivity;
.super Landroid/app/Activity;
.source \"MainActivity.java\"

.method protected onCreate(Landroid/os/Bundle;)V
    .locals 1

    invoke-super {p0, p1}, Landroid/app/Activity;->onCreate(Landroid/os/Bundle;)V

    invoke-static {p0}, Lcom/example/shop/util/Helper;->init(Landroid/content/Context;)V

    return-void
.end method
";

const HELPER: &str = ".class public Lcom/example/shop/util/Helper;
.super Ljava/lang/Object;

.method public static init(Landroid/content/Context;)V
    .locals 1

    const-string v0, \"com.example.shop\"

    return-void
.end method
";

const APKTOOL_YML: &str = "!!brut.androlib.meta.MetaInfo
apkFileName: source.apk
isFrameworkApk: false
packageInfo:
  forcedPackageId: '127'
  renameManifestPackage: null
sdkInfo:
  minSdkVersion: '21'
  targetSdkVersion: '33'
version: 2.9.3
versionInfo:
  versionCode: '12'
  versionName: 3.4.1
";

/// Write what `apktool d` would produce for the fixture app
pub fn write_decoded_app(out: &Path) {
    let files: &[(&str, &str)] = &[
        ("AndroidManifest.xml", MANIFEST),
        ("apktool.yml", APKTOOL_YML),
        ("smali/com/example/shop/MainActivity.smali", MAIN_ACTIVITY),
        ("smali_classes2/com/example/shop/util/Helper.smali", HELPER),
        (
            "res/values/strings.xml",
            r#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <string name="app_name">Shop Classic</string>
    <string name="launcher_label">Shop Classic</string>
    <string name="greeting">Hello</string>
</resources>
"#,
        ),
        (
            "res/values-de/strings.xml",
            r#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <string name="app_name">Laden Klassik</string>
</resources>
"#,
        ),
        ("res/mipmap-xxhdpi/ic_launcher.png", "\u{89}PNG-icon"),
    ];
    for (relative, content) in files {
        let path = out.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

/// Tool behavior to break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Fetch404,
    UnpackReportsError,
    RepackNoOutput,
    AlignFails,
    SignFailsAfterPartialWrite,
    KeygenFails,
    PanicOnRepack,
}

/// Source tree as it was handed to the assembler
pub type Snapshot = BTreeMap<PathBuf, Vec<u8>>;

/// Stands in for curl, apktool, zipalign, apksigner and keytool
#[derive(Default)]
pub struct FakeToolchain {
    fault: Option<Fault>,
    commands: Mutex<Vec<ToolCommand>>,
    snapshot: Mutex<Option<Snapshot>>,
}

impl FakeToolchain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            fault: Some(fault),
            ..Self::default()
        })
    }

    pub fn count(&self, program: &str) -> usize {
        self.commands.lock().unwrap().iter().filter(|c| c.program == program).count()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().unwrap().clone().expect("assembler never ran")
    }

    fn failed(program: &str, stderr: &str) -> ToolError {
        ToolError::Failed {
            program: program.to_string(),
            code: 1,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn apktool(&self, command: &ToolCommand) -> ToolResult<ToolOutput> {
        let out = PathBuf::from(command.flag_value("-o").unwrap());
        match command.args.get(2).map(String::as_str) {
            Some("d") => {
                if self.fault == Some(Fault::UnpackReportsError) {
                    return Ok(ToolOutput {
                        stdout: "Exception in thread \"main\" brut.androlib.AndrolibException".to_string(),
                        ..ToolOutput::default()
                    });
                }
                write_decoded_app(&out);
                Ok(ToolOutput {
                    stdout: "I: Using Apktool 2.9.3 on source.apk".to_string(),
                    ..ToolOutput::default()
                })
            }
            Some("b") => {
                let src = PathBuf::from(&command.args[3]);
                let mut snapshot = Snapshot::new();
                for entry in walkdir::WalkDir::new(&src).into_iter().filter_map(Result::ok) {
                    if entry.file_type().is_file() {
                        let relative = entry.path().strip_prefix(&src).unwrap().to_path_buf();
                        snapshot.insert(relative, fs::read(entry.path()).unwrap());
                    }
                }
                *self.snapshot.lock().unwrap() = Some(snapshot);

                match self.fault {
                    Some(Fault::PanicOnRepack) => panic!("simulated apktool crash"),
                    Some(Fault::RepackNoOutput) => {}
                    _ => fs::write(&out, b"PK\x03\x04rebuilt").unwrap(),
                }
                Ok(ToolOutput::default())
            }
            other => panic!("unexpected apktool mode {:?}", other),
        }
    }
}

#[async_trait]
impl ToolRunner for FakeToolchain {
    async fn run(&self, command: ToolCommand) -> ToolResult<ToolOutput> {
        self.commands.lock().unwrap().push(command.clone());

        match command.program.as_str() {
            "curl" => {
                if self.fault == Some(Fault::Fetch404) {
                    return Err(ToolError::Failed {
                        program: "curl".to_string(),
                        code: 22,
                        stdout: String::new(),
                        stderr: "curl: (22) The requested URL returned error: 404".to_string(),
                    });
                }
                fs::write(command.flag_value("-o").unwrap(), b"PK\x03\x04source")?;
                Ok(ToolOutput::default())
            }
            "java" => self.apktool(&command),
            "zipalign" => {
                if self.fault == Some(Fault::AlignFails) {
                    return Err(Self::failed("zipalign", "Unable to open as zip archive"));
                }
                let input = &command.args[command.args.len() - 2];
                let output = &command.args[command.args.len() - 1];
                fs::copy(input, output)?;
                Ok(ToolOutput::default())
            }
            "apksigner" => {
                let out = command.flag_value("--out").unwrap().to_string();
                if self.fault == Some(Fault::SignFailsAfterPartialWrite) {
                    fs::write(&out, b"PK partial")?;
                    return Err(Self::failed("apksigner", "Failed to load signer"));
                }
                let input = command.args.last().unwrap();
                fs::copy(input, &out)?;
                fs::write(format!("{}.idsig", out), b"v4")?;
                Ok(ToolOutput::default())
            }
            "keytool" => {
                if self.fault == Some(Fault::KeygenFails) {
                    return Err(Self::failed("keytool", "keytool error: java.lang.Exception"));
                }
                let path = command.flag_value("-keystore").unwrap();
                fs::write(path, uuid::Uuid::new_v4().as_bytes())?;
                Ok(ToolOutput::default())
            }
            other => panic!("unexpected tool {}", other),
        }
    }
}

/// Records every delivered payload
#[derive(Default)]
pub struct CapturingSink {
    delivered: Mutex<Vec<(Url, ResultPayload)>>,
}

impl CapturingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn payloads(&self) -> Vec<ResultPayload> {
        self.delivered.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.delivered.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    /// Poll until `n` payloads arrived or two seconds passed
    pub async fn wait_for(&self, n: usize) -> Vec<ResultPayload> {
        for _ in 0..100 {
            if self.delivered.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.payloads()
    }
}

#[async_trait]
impl NotificationSink for CapturingSink {
    fn name(&self) -> &'static str {
        "capturing"
    }

    async fn deliver(&self, callback_url: &Url, payload: &ResultPayload) -> NotifyResult<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((callback_url.clone(), payload.clone()));
        Ok(())
    }
}

/// A temp root with `jobs/` and `downloads/` and a config pointing at them
pub struct Harness {
    pub root: tempfile::TempDir,
    pub config: HardenConfig,
    pub tools: Arc<FakeToolchain>,
    pub sink: Arc<CapturingSink>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(tools: Arc<FakeToolchain>) -> Self {
        Self::with_config(tools, |_| {})
    }

    pub fn with_config(tools: Arc<FakeToolchain>, adjust: impl FnOnce(&mut HardenConfig)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = HardenConfig::default();
        config.paths.jobs_dir = root.path().join("jobs");
        config.paths.output_dir = root.path().join("downloads");
        config.public.base_url = "https://cdn.example.com/".to_string();
        adjust(&mut config);

        let sink = CapturingSink::new();
        let orchestrator = Orchestrator::from_config(&config, tools.clone(), sink.clone());
        Self {
            root,
            config,
            tools,
            sink,
            orchestrator,
        }
    }

    pub fn public_dir(&self, domain: &str) -> PathBuf {
        self.config
            .paths
            .output_dir
            .join("uploads")
            .join(domain)
            .join("app")
            .join("apk")
    }

    pub fn workspace(&self, job_id: uuid::Uuid) -> PathBuf {
        self.config.paths.jobs_dir.join(job_id.to_string())
    }

    /// Names in the public dir, sorted
    pub fn published(&self, domain: &str) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(self.public_dir(domain)) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

pub fn request(naming: &str) -> JobRequest {
    JobRequest {
        apk_url: Some("https://files.example.com/shop.apk".to_string()),
        callback_url: Some("https://hooks.example.com/hardened".to_string()),
        id: Some("42".to_string()),
        domain: Some("shop.example.com".to_string()),
        file_name: Some("shop".to_string()),
        naming: Some(naming.to_string()),
        ..Default::default()
    }
}
