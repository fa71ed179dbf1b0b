// Protection stub, launch reporter and launcher hooks

use std::fs;
use std::path::{Path, PathBuf};

use super::error::{SmaliError, SmaliResult};
use super::rename::smali_roots;

const PROTECTION_TAG: &str = "HARDENING";
const PROTECTION_MESSAGE: &str = "This app is protected by hardening service";
const ON_CREATE_SIGNATURE: &str = "onCreate(Landroid/os/Bundle;)V";

/// Where the injected launch reporter posts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReporterConfig {
    pub report_url: String,
    pub key: String,
}

/// Escape a value for a smali `const-string` / field initializer literal
fn smali_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn package_dir(src_dir: &Path, package: &str) -> PathBuf {
    src_dir.join("smali").join(package.replace('.', "/"))
}

fn write_class(path: &Path, content: &str) -> SmaliResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(SmaliError::io(parent))?;
    }
    fs::write(path, content).map_err(SmaliError::io(path))
}

/// Write `smali/{pkg}/ProtectionLog.smali`, a static logger under a fixed tag
pub fn inject_protection_stub(src_dir: &Path, package: &str) -> SmaliResult<PathBuf> {
    let class = package.replace('.', "/");
    let content = format!(
        r#".class public L{class}/ProtectionLog;
.super Ljava/lang/Object;

.method public static log()V
    .locals 2

    const-string v0, "{tag}"
    const-string v1, "{message}"
    invoke-static {{v0, v1}}, Landroid/util/Log;->i(Ljava/lang/String;Ljava/lang/String;)I

    return-void
.end method
"#,
        class = class,
        tag = PROTECTION_TAG,
        message = PROTECTION_MESSAGE,
    );

    let path = package_dir(src_dir, package).join("ProtectionLog.smali");
    write_class(&path, &content)?;
    Ok(path)
}

/// Type descriptor of the injected reporter class
pub fn reporter_descriptor(package: &str) -> String {
    format!("L{}/LaunchReporter;", package.replace('.', "/"))
}

/// Write `LaunchReporter.smali` and its runnable `LaunchReporter$1.smali`.
///
/// `sendLaunch(Context)` starts a thread that POSTs
/// `{"key": <key>, "event": "app_launch"}` to the report URL and swallows
/// every exception.
pub fn inject_launch_reporter(src_dir: &Path, package: &str, config: &LaunchReporterConfig) -> SmaliResult<()> {
    let class = package.replace('.', "/");
    let dir = package_dir(src_dir, package);

    let outer = format!(
        r#".class public L{class}/LaunchReporter;
.super Ljava/lang/Object;

.field static final REPORT_URL:Ljava/lang/String; = "{url}"

.field static final APK_KEY:Ljava/lang/String; = "{key}"

.method public static sendLaunch(Landroid/content/Context;)V
    .locals 3
    .param p0, "ctx"    # Landroid/content/Context;

    :try_start
    new-instance v0, Ljava/lang/Thread;
    new-instance v1, L{class}/LaunchReporter$1;
    invoke-direct {{v1, p0}}, L{class}/LaunchReporter$1;-><init>(Landroid/content/Context;)V
    invoke-direct {{v0, v1}}, Ljava/lang/Thread;-><init>(Ljava/lang/Runnable;)V
    invoke-virtual {{v0}}, Ljava/lang/Thread;->start()V
    :try_end
    .catch Ljava/lang/Exception; {{:try_start .. :try_end}} :catch_all

    return-void

    :catch_all
    move-exception v0
    return-void
.end method
"#,
        class = class,
        url = smali_string(&config.report_url),
        key = smali_string(&config.key),
    );

    let inner = format!(
        r#".class L{class}/LaunchReporter$1;
.super Ljava/lang/Object;
.implements Ljava/lang/Runnable;

.field final synthetic val$ctx:Landroid/content/Context;

.method constructor <init>(Landroid/content/Context;)V
    .locals 0
    .param p1, "ctx"    # Landroid/content/Context;

    iput-object p1, p0, L{class}/LaunchReporter$1;->val$ctx:Landroid/content/Context;
    invoke-direct {{p0}}, Ljava/lang/Object;-><init>()V
    return-void
.end method

.method public run()V
    .locals 4

    :try_start
    new-instance v0, Lorg/json/JSONObject;
    invoke-direct {{v0}}, Lorg/json/JSONObject;-><init>()V

    const-string v1, "key"
    sget-object v2, L{class}/LaunchReporter;->APK_KEY:Ljava/lang/String;
    invoke-virtual {{v0, v1, v2}}, Lorg/json/JSONObject;->put(Ljava/lang/String;Ljava/lang/Object;)Lorg/json/JSONObject;

    const-string v1, "event"
    const-string v2, "app_launch"
    invoke-virtual {{v0, v1, v2}}, Lorg/json/JSONObject;->put(Ljava/lang/String;Ljava/lang/Object;)Lorg/json/JSONObject;

    new-instance v1, Ljava/net/URL;
    sget-object v2, L{class}/LaunchReporter;->REPORT_URL:Ljava/lang/String;
    invoke-direct {{v1, v2}}, Ljava/net/URL;-><init>(Ljava/lang/String;)V

    invoke-virtual {{v1}}, Ljava/net/URL;->openConnection()Ljava/net/URLConnection;
    move-result-object v1
    check-cast v1, Ljava/net/HttpURLConnection;

    const/4 v2, 0x1
    invoke-virtual {{v1, v2}}, Ljava/net/HttpURLConnection;->setDoOutput(Z)V

    const-string v2, "POST"
    invoke-virtual {{v1, v2}}, Ljava/net/HttpURLConnection;->setRequestMethod(Ljava/lang/String;)V

    const-string v2, "Content-Type"
    const-string v3, "application/json; charset=utf-8"
    invoke-virtual {{v1, v2, v3}}, Ljava/net/HttpURLConnection;->setRequestProperty(Ljava/lang/String;Ljava/lang/String;)V

    invoke-virtual {{v0}}, Lorg/json/JSONObject;->toString()Ljava/lang/String;
    move-result-object v0

    const-string v2, "UTF-8"
    invoke-virtual {{v0, v2}}, Ljava/lang/String;->getBytes(Ljava/lang/String;)[B
    move-result-object v0

    invoke-virtual {{v1}}, Ljava/net/HttpURLConnection;->getOutputStream()Ljava/io/OutputStream;
    move-result-object v2
    invoke-virtual {{v2, v0}}, Ljava/io/OutputStream;->write([B)V
    invoke-virtual {{v2}}, Ljava/io/OutputStream;->flush()V
    invoke-virtual {{v2}}, Ljava/io/OutputStream;->close()V

    invoke-virtual {{v1}}, Ljava/net/HttpURLConnection;->getResponseCode()I
    move-result v0

    invoke-virtual {{v1}}, Ljava/net/HttpURLConnection;->disconnect()V
    :try_end
    .catch Ljava/lang/Exception; {{:try_start .. :try_end}} :catch_block

    return-void

    :catch_block
    move-exception v0
    return-void
.end method
"#,
        class = class,
    );

    write_class(&dir.join("LaunchReporter.smali"), &outer)?;
    write_class(&dir.join("LaunchReporter$1.smali"), &inner)?;
    Ok(())
}

/// Locate the `.smali` file of a fully qualified class in any smali root
pub fn find_class_file(src_dir: &Path, class_name: &str) -> Option<PathBuf> {
    let relative = format!("{}.smali", class_name.replace('.', "/"));
    smali_roots(src_dir)
        .ok()?
        .into_iter()
        .map(|root| root.join(&relative))
        .find(|candidate| candidate.is_file())
}

/// Insert a reporter call into `onCreate(Bundle)` right after its register
/// declaration. `None` when there is no such method or the call is already
/// present.
pub fn insert_launch_hook(content: &str, reporter: &str) -> Option<String> {
    let call = format!("invoke-static {{p0}}, {}->sendLaunch(Landroid/content/Context;)V", reporter);
    if content.contains(&call) {
        return None;
    }

    let lines: Vec<&str> = content.lines().collect();
    let method = lines
        .iter()
        .position(|line| line.trim_start().starts_with(".method") && line.contains(ON_CREATE_SIGNATURE))?;

    let anchor = lines[method + 1..]
        .iter()
        .take_while(|line| !line.trim_start().starts_with(".end method"))
        .position(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with(".locals") || trimmed.starts_with(".registers") || trimmed.starts_with(".prologue")
        })?
        + method
        + 1;

    let mut hooked: Vec<String> = Vec::with_capacity(lines.len() + 2);
    for (i, line) in lines.iter().enumerate() {
        hooked.push(line.to_string());
        if i == anchor {
            hooked.push(String::new());
            hooked.push(format!("    {}", call));
        }
    }
    let mut output = hooked.join("\n");
    output.push('\n');
    Some(output)
}

/// Hook every launcher class that has a smali file; returns how many were
/// hooked. Individual failures are logged and skipped.
pub fn hook_launchers(src_dir: &Path, package: &str, launcher_classes: &[String]) -> usize {
    let reporter = reporter_descriptor(package);
    let mut hooked = 0;

    for class in launcher_classes {
        let Some(path) = find_class_file(src_dir, class) else {
            log::debug!("no smali found for launcher {}", class);
            continue;
        };
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("cannot read {}: {}", path.display(), e);
                continue;
            }
        };
        let Some(updated) = insert_launch_hook(&content, &reporter) else {
            log::debug!("launcher {} has no hookable onCreate", class);
            continue;
        };
        match fs::write(&path, updated) {
            Ok(()) => hooked += 1,
            Err(e) => log::warn!("cannot write {}: {}", path.display(), e),
        }
    }
    hooked
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVITY: &str = r#".class public Lcom/example/app/MainActivity;
.super Landroid/app/Activity;

.method protected onCreate(Landroid/os/Bundle;)V
    .locals 1

    invoke-super {p0, p1}, Landroid/app/Activity;->onCreate(Landroid/os/Bundle;)V
    return-void
.end method
"#;

    #[test]
    fn test_insert_launch_hook_after_locals() {
        let reporter = reporter_descriptor("com.example.app");
        let hooked = insert_launch_hook(ACTIVITY, &reporter).unwrap();
        let lines: Vec<&str> = hooked.lines().collect();
        let locals = lines.iter().position(|l| l.trim() == ".locals 1").unwrap();
        assert_eq!(
            lines[locals + 2].trim(),
            "invoke-static {p0}, Lcom/example/app/LaunchReporter;->sendLaunch(Landroid/content/Context;)V"
        );
        assert!(insert_launch_hook(&hooked, &reporter).is_none());
    }

    #[test]
    fn test_insert_launch_hook_needs_on_create() {
        let content = ".class LX;\n.method public onResume()V\n    .locals 0\n    return-void\n.end method\n";
        assert!(insert_launch_hook(content, "LX/LaunchReporter;").is_none());

        let registers = ".method public onCreate(Landroid/os/Bundle;)V\n    .registers 3\n.end method\n";
        assert!(insert_launch_hook(registers, "LX/LaunchReporter;").is_some());
    }

    #[test]
    fn test_stub_and_reporter_files() {
        let dir = tempfile::tempdir().unwrap();
        let stub = inject_protection_stub(dir.path(), "com.example.app").unwrap();
        assert!(stub.ends_with("smali/com/example/app/ProtectionLog.smali"));
        assert!(fs::read_to_string(&stub).unwrap().contains(".class public Lcom/example/app/ProtectionLog;"));

        let config = LaunchReporterConfig {
            report_url: "https://telemetry.example.com/launch?a=\"b\"".to_string(),
            key: "k1".to_string(),
        };
        inject_launch_reporter(dir.path(), "com.example.app", &config).unwrap();
        let outer = fs::read_to_string(dir.path().join("smali/com/example/app/LaunchReporter.smali")).unwrap();
        assert!(outer.contains(r#"= "https://telemetry.example.com/launch?a=\"b\"""#));
        assert!(outer.contains(r#"APK_KEY:Ljava/lang/String; = "k1""#));
        assert!(dir.path().join("smali/com/example/app/LaunchReporter$1.smali").is_file());
    }

    #[test]
    fn test_hook_launchers_searches_all_roots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smali_classes2/com/example/app/MainActivity.smali");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, ACTIVITY).unwrap();
        fs::create_dir_all(dir.path().join("smali")).unwrap();

        let classes = vec!["com.example.app.MainActivity".to_string(), "com.example.app.Missing".to_string()];
        assert_eq!(hook_launchers(dir.path(), "com.example.app", &classes), 1);
        assert!(fs::read_to_string(&path).unwrap().contains("LaunchReporter;->sendLaunch"));
    }
}
