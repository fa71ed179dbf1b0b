use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Writes a unique payload per generation so reuse is observable
struct CountingGenerator {
    calls: AtomicUsize,
}

impl CountingGenerator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl KeystoreGenerator for CountingGenerator {
    async fn generate(&self, path: &Path) -> KeystoreResult<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(path, format!("key-{}", n)).map_err(|source| KeystoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

struct BrokenGenerator;

#[async_trait]
impl KeystoreGenerator for BrokenGenerator {
    async fn generate(&self, _path: &Path) -> KeystoreResult<()> {
        Ok(())
    }
}

fn subject<'a>(package: &'a str, file_name: &'a str, id: &'a str) -> SigningSubject<'a> {
    SigningSubject {
        package,
        file_name,
        correlation_id: id,
    }
}

#[tokio::test]
async fn test_same_key_reuses_identical_credential() {
    let dir = tempfile::tempdir().unwrap();
    let generator = CountingGenerator::new();
    let store = IdentityStore::new(dir.path().join("keystores"), Arc::new(KeyDerivationPolicy::FileAndId), generator.clone());

    let first = store.credential_for(&subject("com.a.one", "shop", "7")).await.unwrap();
    let before = std::fs::read(&first.path).unwrap();

    // Package changed between runs, but file-and-id binding is unaffected
    let second = store.credential_for(&subject("com.b.two", "shop", "7")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(std::fs::read(&second.path).unwrap(), before);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_different_key_never_reuses_existing_credential() {
    let dir = tempfile::tempdir().unwrap();
    let generator = CountingGenerator::new();
    let store = IdentityStore::new(dir.path().to_path_buf(), Arc::new(KeyDerivationPolicy::Package), generator.clone());

    let first = store.credential_for(&subject("com.example.one", "a", "1")).await.unwrap();
    let second = store.credential_for(&subject("com.example.two", "a", "1")).await.unwrap();

    assert_ne!(first.path, second.path);
    assert_ne!(std::fs::read(&first.path).unwrap(), std::fs::read(&second.path).unwrap());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_credentials_survive_store_recreation() {
    let dir = tempfile::tempdir().unwrap();
    let generator = CountingGenerator::new();
    let path = {
        let store = IdentityStore::new(dir.path().to_path_buf(), Arc::new(KeyDerivationPolicy::PackageHash), generator.clone());
        store.credential_for(&subject("com.example.app", "a", "1")).await.unwrap().path
    };

    let store = IdentityStore::new(dir.path().to_path_buf(), Arc::new(KeyDerivationPolicy::PackageHash), generator.clone());
    let again = store.credential_for(&subject("com.example.app", "b", "2")).await.unwrap();

    assert_eq!(again.path, path);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_generator_that_writes_nothing_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = IdentityStore::new(dir.path().to_path_buf(), Arc::new(KeyDerivationPolicy::FileAndId), Arc::new(BrokenGenerator));

    let err = store.credential_for(&subject("com.x.y", "f", "1")).await.unwrap_err();
    assert!(matches!(err, KeystoreError::MissingAfterGeneration { .. }));
}

#[test]
fn test_credential_uses_fixed_alias_and_passphrase() {
    let credential = KeystoreCredential::new(PathBuf::from("a.keystore"));
    assert_eq!(credential.alias, KEY_ALIAS);
    assert_eq!(credential.store_password, KEY_PASSWORD);
    assert_eq!(credential.key_password, KEY_PASSWORD);
}

#[tokio::test]
async fn test_ids_differing_only_in_unsafe_chars_get_distinct_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let generator = CountingGenerator::new();
    let store = IdentityStore::new(dir.path().to_path_buf(), Arc::new(KeyDerivationPolicy::FileAndId), generator.clone());

    let mut paths = Vec::new();
    for id in ["a/b", "a_b", "a b"] {
        let credential = store.credential_for(&subject("com.example.app", "shop", id)).await.unwrap();
        assert_eq!(credential.path.parent(), Some(dir.path()));
        paths.push(credential.path);
    }

    assert_eq!(paths[1], dir.path().join("shop_a_b.keystore"));
    assert_ne!(paths[0], paths[1]);
    assert_ne!(paths[0], paths[2]);
    assert_ne!(paths[1], paths[2]);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
}
