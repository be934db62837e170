//! End-to-end session scenarios: hydration, commit, deletion sweep, and
//! fault/remount handling through the full controller loop.

use super::test_utils::{seed_file, FaultyVolume, FlakyMountVolume};
use flashbridge::block::HeapBlockDevice;
use flashbridge::config::BridgeConfig;
use flashbridge::hw::NoopReadiness;
use flashbridge::scsi::{HostCommand, InquiryData, MassStorage, ScriptedTransport};
use flashbridge::session::{CommitReport, SessionController};
use flashbridge::vfs::DirVolume;
use std::fs;
use tempfile::TempDir;

fn test_config(settle_samples: u32) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.detector.settle_samples = settle_samples;
    config.usb.reconnect_delay_ms = 0;
    config.staging.capacity_bytes = 8192;
    config
}

fn test_msc(config: &BridgeConfig) -> MassStorage<HeapBlockDevice> {
    MassStorage::new(
        HeapBlockDevice::new(config.staging.capacity_bytes, config.staging.erase_block_size),
        InquiryData::new(&config.usb.vendor, &config.usb.product, &config.usb.revision),
    )
}

/// A block write the host would issue; data content is irrelevant to the
/// detector, only the activity tick matters.
fn host_block_write() -> HostCommand {
    HostCommand::Write {
        lba: 0,
        data: vec![0u8; 512],
    }
}

/// Service until the controller reports a finished commit.
fn service_until_commit<P, S>(
    session: &mut SessionController<P, S, HeapBlockDevice>,
    transport: &mut ScriptedTransport,
    max_ticks: u32,
) -> CommitReport
where
    P: flashbridge::vfs::Volume,
    S: flashbridge::vfs::Volume,
{
    for _ in 0..max_ticks {
        if let Some(report) = session.service(transport) {
            return report;
        }
    }
    panic!("no commit within {} ticks", max_ticks);
}

#[test]
fn scenario_a_boot_hydrates_staging_from_persistent() {
    let tmp = TempDir::new().unwrap();
    let flash_root = tmp.path().join("flash");
    let ram_root = tmp.path().join("ram");
    seed_file(&flash_root, "a.txt", b"hello");
    seed_file(&flash_root, "sub/b.txt", b"abc");

    let config = test_config(1);
    let mut session = SessionController::new(
        &config,
        DirVolume::new("/flash", &flash_root),
        DirVolume::new("/ram", &ram_root),
        test_msc(&config),
    );
    let mut transport = ScriptedTransport::new();
    let stats = session
        .boot(&mut NoopReadiness::default(), &mut transport)
        .unwrap();

    assert_eq!(stats.files_copied, 2);
    assert_eq!(fs::read(ram_root.join("a.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(ram_root.join("sub/b.txt")).unwrap(), b"abc");
    assert!(session.mass_storage().host_attached());
}

#[test]
fn scenario_b_new_host_file_is_committed_after_quiescence() {
    let tmp = TempDir::new().unwrap();
    let flash_root = tmp.path().join("flash");
    let ram_root = tmp.path().join("ram");
    fs::create_dir_all(&flash_root).unwrap();

    let config = test_config(2);
    let mut session = SessionController::new(
        &config,
        DirVolume::new("/flash", &flash_root),
        DirVolume::new("/ram", &ram_root),
        test_msc(&config),
    );
    let mut transport = ScriptedTransport::new();
    session
        .boot(&mut NoopReadiness::default(), &mut transport)
        .unwrap();

    // Host writes a new file: block traffic plus the resulting staging entry.
    seed_file(&ram_root, "c.txt", b"fresh from the host");
    transport.push(host_block_write());
    transport.push(host_block_write());

    let report = service_until_commit(&mut session, &mut transport, 20);
    assert_eq!(report.replicated.files_copied, 1);
    assert_eq!(
        fs::read(flash_root.join("c.txt")).unwrap(),
        b"fresh from the host"
    );
}

#[test]
fn scenario_c_host_deletion_is_swept_from_persistent() {
    let tmp = TempDir::new().unwrap();
    let flash_root = tmp.path().join("flash");
    let ram_root = tmp.path().join("ram");
    seed_file(&flash_root, "a.txt", b"hello");
    seed_file(&flash_root, "sub/b.txt", b"abc");

    let config = test_config(1);
    let mut session = SessionController::new(
        &config,
        DirVolume::new("/flash", &flash_root),
        DirVolume::new("/ram", &ram_root),
        test_msc(&config),
    );
    let mut transport = ScriptedTransport::new();
    session
        .boot(&mut NoopReadiness::default(), &mut transport)
        .unwrap();

    // Host deletes /ram/a.txt, then stops writing.
    fs::remove_file(ram_root.join("a.txt")).unwrap();
    transport.push(host_block_write());

    let report = service_until_commit(&mut session, &mut transport, 20);
    assert_eq!(report.swept.entries_removed, 1);
    assert!(!flash_root.join("a.txt").exists());
    assert_eq!(fs::read(flash_root.join("sub/b.txt")).unwrap(), b"abc");
}

#[test]
fn scenario_d_mid_copy_fault_skips_entry_but_commits_the_rest() {
    let tmp = TempDir::new().unwrap();
    let flash_root = tmp.path().join("flash");
    let ram_root = tmp.path().join("ram");
    fs::create_dir_all(&flash_root).unwrap();

    let config = test_config(1);
    let mut session = SessionController::new(
        &config,
        FaultyVolume::new(DirVolume::new("/flash", &flash_root), "d.txt"),
        DirVolume::new("/ram", &ram_root),
        test_msc(&config),
    );
    let mut transport = ScriptedTransport::new();
    session
        .boot(&mut NoopReadiness::default(), &mut transport)
        .unwrap();

    seed_file(&ram_root, "c.txt", b"good");
    seed_file(&ram_root, "d.txt", b"doomed");
    transport.push(host_block_write());

    let report = service_until_commit(&mut session, &mut transport, 20);
    assert_eq!(report.replicated.files_copied, 1);
    assert_eq!(report.replicated.entries_skipped, 1);
    assert_eq!(fs::read(flash_root.join("c.txt")).unwrap(), b"good");
}

#[test]
fn remount_failure_defers_commit_to_a_later_poll() {
    let tmp = TempDir::new().unwrap();
    let flash_root = tmp.path().join("flash");
    let ram_root = tmp.path().join("ram");
    fs::create_dir_all(&flash_root).unwrap();

    let config = test_config(1);
    let mut session = SessionController::new(
        &config,
        DirVolume::new("/flash", &flash_root),
        FlakyMountVolume::new(DirVolume::new("/ram", &ram_root), 0),
        test_msc(&config),
    );
    let mut transport = ScriptedTransport::new();
    session
        .boot(&mut NoopReadiness::default(), &mut transport)
        .unwrap();

    seed_file(&ram_root, "late.txt", b"late");
    session.staging_mut().arm_failures(1);
    transport.push(host_block_write());

    // Burst settles, but the remount fails: the commit stays pending.
    session.service(&mut transport);
    let deferred = session.service(&mut transport);
    assert_eq!(deferred, None);
    assert!(session.commit_pending());

    // Next poll retries the mount and the commit goes through.
    let report = service_until_commit(&mut session, &mut transport, 5);
    assert!(!session.commit_pending());
    assert_eq!(report.replicated.files_copied, 1);
    assert!(flash_root.join("late.txt").exists());
}

#[test]
fn commit_cycle_is_stable_with_no_host_changes() {
    let tmp = TempDir::new().unwrap();
    let flash_root = tmp.path().join("flash");
    let ram_root = tmp.path().join("ram");
    seed_file(&flash_root, "a.txt", b"hello");

    let config = test_config(1);
    let mut session = SessionController::new(
        &config,
        DirVolume::new("/flash", &flash_root),
        DirVolume::new("/ram", &ram_root),
        test_msc(&config),
    );
    let mut transport = ScriptedTransport::new();
    session
        .boot(&mut NoopReadiness::default(), &mut transport)
        .unwrap();

    // A burst with no tree changes commits identical bytes and sweeps nothing.
    transport.push(host_block_write());
    let report = service_until_commit(&mut session, &mut transport, 20);
    assert_eq!(report.replicated.files_copied, 1);
    assert_eq!(report.swept.entries_removed, 0);
    assert_eq!(fs::read(flash_root.join("a.txt")).unwrap(), b"hello");
}
