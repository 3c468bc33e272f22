//! Tests for platform detection.
//!
//! Validates runtime detection and platform string formatting.

use vmrig::{Arch, Os, Platform};

// =============================================================================
// Platform Detection Tests
// =============================================================================

#[test]
fn test_platform_detect_returns_valid_os() {
    let platform = Platform::detect();

    #[cfg(target_os = "linux")]
    assert_eq!(platform.os, Os::Linux);

    #[cfg(target_os = "macos")]
    assert_eq!(platform.os, Os::Darwin);

    #[cfg(target_os = "windows")]
    assert_eq!(platform.os, Os::Windows);
}

#[test]
fn test_platform_detect_returns_valid_arch() {
    let platform = Platform::detect();

    #[cfg(target_arch = "x86_64")]
    assert_eq!(platform.arch, Arch::Amd64);

    #[cfg(target_arch = "aarch64")]
    assert_eq!(platform.arch, Arch::Arm64);

    #[cfg(target_arch = "arm")]
    assert_eq!(platform.arch, Arch::Arm);
}

#[cfg(target_os = "linux")]
#[test]
fn test_kernel_version_detected_on_linux() {
    let platform = Platform::detect();
    assert!(platform.kernel_version.is_some(), "uname -r should succeed");
}

// =============================================================================
// Formatting Tests
// =============================================================================

#[test]
fn test_platform_string_format() {
    assert_eq!(Platform::new(Os::Linux, Arch::Amd64).platform_string(), "linux/amd64");
    assert_eq!(Platform::new(Os::Windows, Arch::Arm64).platform_string(), "windows/arm64");
}

#[test]
fn test_display_includes_kernel() {
    let mut platform = Platform::new(Os::Linux, Arch::Arm);
    assert_eq!(platform.to_string(), "linux/arm");

    platform.kernel_version = Some("6.1.0".to_string());
    assert_eq!(platform.to_string(), "linux/arm (kernel 6.1.0)");
}

#[test]
fn test_bsd_family() {
    assert!(Platform::new(Os::Darwin, Arch::Arm64).is_bsd_like());
    assert!(Platform::new(Os::Bsd, Arch::Amd64).is_bsd_like());
    assert!(!Platform::new(Os::Linux, Arch::Amd64).is_bsd_like());
}
