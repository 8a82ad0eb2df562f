use storage_contracts::StorageErrorKind;
use storage_testing::fixture::CONTAINER_NAME;
use storage_testing::{CallKind, VolumeFixture};
use storage_types::{FilesystemType, LockState};
use storage_volume::VolumeManager;

const PASSWORD: &[u8] = b"hunter2";
const SIZE: usize = 64 * 1024;

fn formatted(fixture: &VolumeFixture) -> VolumeManager {
    let mut manager = fixture.manager();
    manager
        .format_luks(PASSWORD, FilesystemType::Ext4)
        .expect("format succeeds");
    fixture.log.clear();
    manager
}

#[test]
fn lock_unmounts_removes_mount_point_and_deactivates() {
    let fixture = VolumeFixture::new(SIZE);
    let mut manager = formatted(&fixture);

    manager.lock().expect("lock succeeds");

    assert_eq!(
        fixture.log.calls(),
        vec![
            CallKind::Unmount,
            CallKind::RemoveDirectory,
            CallKind::Deactivate
        ]
    );
    assert!(manager.is_locked());
    assert!(!fixture.crypto.is_active(CONTAINER_NAME));
    assert!(fixture.filesystem.mounted_at(VolumeFixture::mount_point()).is_none());
}

#[test]
fn unmount_failure_keeps_the_volume_unlocked() {
    let fixture = VolumeFixture::new(SIZE);
    let mut manager = formatted(&fixture);
    fixture.log.fail_on(CallKind::Unmount);

    let err = manager.lock().expect_err("unmount fails");
    assert_eq!(err.kind, StorageErrorKind::InternalFailure);
    assert!(!manager.is_locked());
    assert_eq!(fixture.log.calls(), vec![CallKind::Unmount]);
}

#[test]
fn later_lock_failures_keep_the_volume_unlocked() {
    for step in [CallKind::RemoveDirectory, CallKind::Deactivate] {
        let fixture = VolumeFixture::new(SIZE);
        let mut manager = formatted(&fixture);
        fixture.log.fail_on(step);

        let err = manager.lock().expect_err("injected failure");
        assert_eq!(err.kind, StorageErrorKind::InternalFailure, "step {step:?}");
        assert_eq!(manager.state(), LockState::Unlocked, "step {step:?}");
    }
}

#[test]
fn lock_after_failure_can_be_retried() {
    let fixture = VolumeFixture::new(SIZE);
    let mut manager = formatted(&fixture);
    fixture.log.fail_on(CallKind::Unmount);
    manager.lock().expect_err("unmount fails");

    fixture.log.clear_failures();
    manager.lock().expect("retry succeeds");
    assert!(manager.is_locked());
}

#[test]
fn lock_while_locked_is_refused() {
    let fixture = VolumeFixture::new(SIZE);
    let mut manager = fixture.manager();

    let err = manager.lock().expect_err("already locked");
    assert_eq!(err.kind, StorageErrorKind::InvalidState);
    assert!(fixture.log.calls().is_empty());
}

#[test]
fn unlock_activates_and_mounts() {
    let fixture = VolumeFixture::new(SIZE);
    let mut manager = formatted(&fixture);
    manager.lock().expect("lock");
    fixture.log.clear();

    manager.unlock(PASSWORD).expect("unlock succeeds");

    assert_eq!(
        fixture.log.calls(),
        vec![
            CallKind::Load,
            CallKind::ActivateByPassphrase,
            CallKind::DirectoryExists,
            CallKind::CreateDirectory,
            CallKind::Mount,
        ]
    );
    assert!(!manager.is_locked());
    assert!(fixture.crypto.is_active(CONTAINER_NAME));
    assert_eq!(
        fixture.filesystem.mounted_at(VolumeFixture::mount_point()),
        Some((manager.crypt_device_path(), FilesystemType::Ext4))
    );
}

#[test]
fn unlock_without_header_is_resource_not_found() {
    let fixture = VolumeFixture::new(SIZE);
    fixture.log.fail_on(CallKind::Load);
    let mut manager = fixture.manager();

    let err = manager.unlock(PASSWORD).expect_err("no header");
    assert_eq!(err.kind, StorageErrorKind::ResourceNotFound);
    assert!(manager.is_locked());
    assert_eq!(fixture.log.calls(), vec![CallKind::Load]);
}

#[test]
fn unlock_with_wrong_passphrase_is_internal_failure() {
    let fixture = VolumeFixture::with_crypto(SIZE, |crypto| crypto.with_passphrase(PASSWORD));
    let mut manager = fixture.manager();

    let err = manager.unlock(b"wrong").expect_err("bad passphrase");
    assert_eq!(err.kind, StorageErrorKind::InternalFailure);
    assert!(manager.is_locked());
    assert_eq!(fixture.log.count(CallKind::Deactivate), 0);
}

#[test]
fn unlock_mount_failure_closes_the_mapping() {
    let fixture = VolumeFixture::new(SIZE);
    fixture.log.fail_on(CallKind::Mount);
    let mut manager = fixture.manager();

    let err = manager.unlock(PASSWORD).expect_err("mount fails");
    assert_eq!(err.kind, StorageErrorKind::InternalFailure);
    assert!(manager.is_locked());
    assert!(!fixture.crypto.is_active(CONTAINER_NAME));
    assert!(!fixture.filesystem.has_directory(VolumeFixture::mount_point()));
}

#[test]
fn unlock_while_unlocked_is_refused() {
    let fixture = VolumeFixture::new(SIZE);
    let mut manager = formatted(&fixture);

    let err = manager.unlock(PASSWORD).expect_err("already unlocked");
    assert_eq!(err.kind, StorageErrorKind::InvalidState);
}

#[test]
fn attached_state_is_respected() {
    let fixture = VolumeFixture::new(SIZE);
    let mut manager = fixture.manager().with_state(LockState::Unlocked);
    manager.lock().expect("lock an attached volume");
    assert!(manager.is_locked());
}

#[test]
fn change_password_passes_exact_buffers() {
    let fixture = VolumeFixture::new(SIZE);
    let manager = fixture.manager();
    let old = b"old\0secret with nul".to_vec();
    let new = vec![0xffu8; 300];

    manager.change_password(&old, &new).expect("change succeeds");

    assert_eq!(
        fixture.log.calls(),
        vec![CallKind::Load, CallKind::KeyslotChangeByPassphrase]
    );
    assert_eq!(fixture.crypto.changes(), vec![(old, new)]);
    assert!(manager.is_locked());
}

#[test]
fn change_password_failures_are_internal() {
    for step in [CallKind::Load, CallKind::KeyslotChangeByPassphrase] {
        let fixture = VolumeFixture::new(SIZE);
        fixture.log.fail_on(step);
        let manager = fixture.manager();

        let err = manager
            .change_password(b"old", b"new")
            .expect_err("injected failure");
        assert_eq!(err.kind, StorageErrorKind::InternalFailure, "step {step:?}");
        assert!(manager.is_locked());
    }
}

#[test]
fn accessors_describe_the_volume() {
    let fixture = VolumeFixture::new(SIZE);
    let manager = fixture.manager();
    assert_eq!(
        manager.crypt_device_path(),
        std::path::PathBuf::from("/dev/mapper/emmc_luks")
    );
    assert_eq!(manager.mount_point(), VolumeFixture::mount_point());
    assert_eq!(manager.identity(), &VolumeFixture::identity());
    assert_eq!(manager.bounds(), fixture.bounds);
}
