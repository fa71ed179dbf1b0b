// Permission pruning and application flag/version hardening

use rand::Rng;

use super::model::AndroidManifest;

/// Permissions removed from every hardened archive, in upper-case canonical form
pub const DENIED_PERMISSIONS: &[&str] = &[
    // critical
    "android.permission.READ_PRIVILEGED_PHONE_STATE",
    "android.permission.MOUNT_UNMOUNT_FILESYSTEMS",
    "android.permission.MODIFY_PHONE_STATE",
    "android.permission.PACKAGE_USAGE_STATS",
    "android.permission.BIND_NOTIFICATION_LISTENER_SERVICE",
    "android.permission.REQUEST_INSTALL_PACKAGES",
    "android.permission.SYSTEM_ALERT_WINDOW",
    "android.permission.WRITE_SETTINGS",
    "android.permission.READ_LOGS",
    // dangerous
    "android.permission.READ_SMS",
    "android.permission.SEND_SMS",
    "android.permission.READ_CONTACTS",
    "android.permission.WRITE_CONTACTS",
    "android.permission.READ_CALL_LOG",
    "android.permission.PROCESS_OUTGOING_CALLS",
    "android.permission.CALL_PHONE",
    "android.permission.ANSWER_PHONE_CALLS",
    "android.permission.READ_PHONE_STATE",
    "android.permission.ACCESS_FINE_LOCATION",
    "android.permission.ACCESS_COARSE_LOCATION",
    "android.permission.ACCESS_BACKGROUND_LOCATION",
    "android.permission.RECORD_AUDIO",
    "android.permission.CAMERA",
    "android.permission.READ_EXTERNAL_STORAGE",
    "android.permission.WRITE_EXTERNAL_STORAGE",
];

/// `<application>` attributes stripped during hardening
const STRIPPED_APPLICATION_FLAGS: &[&str] = &["debuggable", "allowBackup", "fullBackupContent", "networkSecurityConfig"];

const VERSION_SUFFIX_DIGITS: usize = 4;

fn is_denied(permission: &str) -> bool {
    DENIED_PERMISSIONS
        .iter()
        .any(|denied| denied.eq_ignore_ascii_case(permission.trim()))
}

/// Remove deny-listed `uses-permission` and `uses-permission-sdk-23`
/// declarations, returning how many were removed
pub fn prune_permissions(manifest: &mut AndroidManifest) -> usize {
    let removed = manifest.root_mut().retain_elements(|element| {
        let is_request = matches!(element.local_name(), "uses-permission" | "uses-permission-sdk-23");
        !(is_request && element.android_attribute("name").map(is_denied).unwrap_or(false))
    });
    if removed > 0 {
        log::info!("removed {} risky permission declarations", removed);
    }
    removed
}

/// Version pair before and after hardening
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardenedVersion {
    pub old_code: u64,
    pub new_code: u64,
    pub old_name: String,
    pub new_name: String,
}

/// Replace the final dotted segment of `version_name` with a random numeric
/// suffix, or append one when there is no dot
pub fn next_version_name<R: Rng + ?Sized>(version_name: &str, rng: &mut R) -> String {
    let base = match version_name.trim() {
        "" => "1.0",
        trimmed => trimmed,
    };
    let suffix: String = (0..VERSION_SUFFIX_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();

    match base.rsplit_once('.') {
        Some((prefix, _)) => format!("{}.{}", prefix, suffix),
        None => format!("{}.{}", base, suffix),
    }
}

/// Strip debug/backup/network-config flags and write the new version pair
/// onto the manifest root.
///
/// `versionCode` stays at `old_code` unless an override is supplied.
pub fn harden_application<R: Rng + ?Sized>(
    manifest: &mut AndroidManifest,
    old_code: u64,
    old_name: &str,
    version_code_override: Option<u64>,
    rng: &mut R,
) -> HardenedVersion {
    if let Some(application) = manifest.application_mut() {
        for flag in STRIPPED_APPLICATION_FLAGS {
            if application.remove_android_attribute(flag) {
                log::debug!("stripped android:{} from <application>", flag);
            }
        }
    }

    let new_code = version_code_override.unwrap_or(old_code);
    let new_name = next_version_name(old_name, rng);
    manifest.set_version(new_code, &new_name);

    HardenedVersion {
        old_code,
        new_code,
        old_name: old_name.to_string(),
        new_name,
    }
}
