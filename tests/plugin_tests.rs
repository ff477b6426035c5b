//! Integration tests for the plugin loader, driven by the demo plugin
//! cdylibs built in this workspace.

use std::path::PathBuf;

use parlance::abi::{self, PLUGIN_CLASS};
use parlance::{HOST_ABI, PluginError, Version};

/// Locate a workspace cdylib artifact next to this test binary
/// (`target/<profile>/deps/..` -> `target/<profile>/`).
fn artifact(stem: &str) -> Option<PathBuf> {
    let file = format!(
        "{}{stem}{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    );
    let exe = std::env::current_exe().ok()?;
    let profile_dir = exe.parent()?.parent()?;
    let candidate = profile_dir.join(&file);
    candidate.exists().then_some(candidate)
}

macro_rules! require_artifact {
    ($stem:literal) => {
        match artifact($stem) {
            Some(path) => path,
            None => {
                eprintln!("skipping: cdylib '{}' not built alongside this test", $stem);
                return;
            }
        }
    };
}

// =============================================================================
// Loading, registration, unloading
// =============================================================================

#[test]
fn demo_plugin_full_round_trip() {
    let path = require_artifact!("parlance_demo_plugin");
    let runtime = parlance::init().unwrap();

    // --- load ---
    let plugin = runtime.load_plugin(&path).unwrap();
    assert!(plugin.is_a(PLUGIN_CLASS));
    assert_eq!(plugin.ref_count(), 1);
    assert!(runtime.plugins().is_loaded(&path));

    let info = runtime.plugins().info(&plugin).unwrap();
    assert_eq!(info.name, "demo-voice");
    assert_eq!(info.version, Version::new(1, 0));
    assert_eq!(info.built_against, HOST_ABI);

    let printed = plugin.print().unwrap();
    assert!(printed.contains("demo-voice"), "{printed}");

    // --- the plugin's class is live ---
    assert!(runtime.registry().is_registered("EchoVoice"));
    let voice = runtime.allocate("EchoVoice").unwrap();
    // The plugin's raw init callback ran on the zeroed state.
    voice.with_data(|data| assert_eq!(data[0], 1));
    assert_eq!(voice.print().as_deref(), Some("echo-voice g1"));

    // --- loading the same path again hits the cache ---
    let again = runtime.load_plugin(&path).unwrap();
    assert!(again.same_instance(&plugin));
    assert_eq!(plugin.ref_count(), 2);
    again.release();

    // --- the instance must go before the plugin may unload cleanly ---
    let err = runtime.registry().unregister("EchoVoice").unwrap_err();
    assert!(matches!(
        err,
        parlance::ObjectError::ClassInUse { live: 1, .. }
    ));
    voice.release();

    // --- releasing the last plugin reference unloads it ---
    plugin.release();
    assert!(!runtime.registry().is_registered("EchoVoice"));
    assert!(!runtime.plugins().is_loaded(&path));

    // --- a fresh load works after a full unload ---
    let reloaded = runtime.load_plugin(&path).unwrap();
    assert!(runtime.registry().is_registered("EchoVoice"));
    reloaded.release();
    assert!(!runtime.registry().is_registered("EchoVoice"));

    runtime.quit();
}

// =============================================================================
// The ABI version gate
// =============================================================================

#[test]
fn future_plugin_fails_the_version_gate() {
    let path = require_artifact!("parlance_demo_plugin_future");
    let runtime = parlance::init().unwrap();

    let err = runtime.load_plugin(&path).unwrap_err();
    match err {
        parlance::Error::Plugin(PluginError::VersionMismatch {
            plugin,
            built_against,
            host,
        }) => {
            assert_eq!(plugin, "demo-from-the-future");
            assert_eq!(built_against, Version::new(HOST_ABI.major, HOST_ABI.minor + 1));
            assert_eq!(host, HOST_ABI);
        }
        other => panic!("expected VersionMismatch, got {other}"),
    }

    // No registration side effects.
    assert!(!runtime.registry().is_registered("NeverRegistered"));
    assert!(!runtime.plugins().is_loaded(&path));

    runtime.quit();
}

#[test]
fn version_rule_is_same_major_minor_at_least() {
    assert!(HOST_ABI.accepts(Version::new(HOST_ABI.major, 0)));
    assert!(HOST_ABI.accepts(HOST_ABI));
    assert!(!HOST_ABI.accepts(Version::new(HOST_ABI.major, HOST_ABI.minor + 1)));
    assert!(!HOST_ABI.accepts(Version::new(HOST_ABI.major + 1, 0)));
}

// =============================================================================
// Error reporting
// =============================================================================

#[test]
fn missing_plugin_reports_path() {
    let runtime = parlance::init().unwrap();
    let err = runtime.load_plugin("/no/such/plugin.so").unwrap_err();
    assert!(err.to_string().contains("/no/such/plugin.so"));
    runtime.quit();
}

#[test]
fn status_codes_are_stable() {
    // The boundary codes are part of the plugin ABI.
    assert_eq!(abi::CODE_OK, 0);
    assert_eq!(abi::CODE_FAILURE, 1);
    assert_eq!(abi::CODE_DUPLICATE_CLASS, 2);
    assert_eq!(abi::CODE_CLASS_NOT_FOUND, 3);
    assert_eq!(abi::CODE_VERSION_MISMATCH, 4);
    assert_eq!(abi::CODE_INVALID_DESCRIPTOR, 5);
    assert_eq!(abi::CODE_CLASS_IN_USE, 6);
}
