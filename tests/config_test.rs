#![cfg(unix)]

use dyngen::core::config::DEFAULT_CACHE_SIZE_KB;
use dyngen::{initialize, Arch, JitConfig};

#[test]
fn enabled_config_builds_a_host_generator() {
    let config = JitConfig::from_prefs([("jit", "yes"), ("jitcachesize", "128")]).unwrap();
    let Some(arch) = Arch::host() else {
        assert!(initialize(&config).is_none());
        return;
    };

    let gen = initialize(&config).unwrap();
    assert_eq!(gen.arch(), arch);
    assert!(gen.cache().size() >= 128 * 1024);
    assert!(!gen.full_translation_cache());
    assert!(gen.code_start() > 0);
}

#[test]
fn disabled_config_builds_nothing() {
    let config = JitConfig::from_prefs([("jit", "off")]).unwrap();
    assert_eq!(config.cache_size_kb, DEFAULT_CACHE_SIZE_KB);
    assert!(initialize(&config).is_none());
}

#[test]
fn unknown_preferences_are_errors() {
    assert!(JitConfig::from_prefs([("turbo", "1")]).is_err());
    assert!(JitConfig::from_prefs([("jitcachesize", "-4")]).is_err());
}
