use storage_contracts::StorageErrorKind;
use storage_testing::fixture::CONTAINER_NAME;
use storage_testing::{CallKind, VolumeFixture};
use storage_types::{FilesystemType, LockState};

const PASSWORD: &[u8] = b"correct horse battery staple";
const SIZE: usize = 64 * 1024;

const FORMAT_STEPS: [CallKind; 9] = [
    CallKind::Format,
    CallKind::KeyslotAddByVolumeKey,
    CallKind::Load,
    CallKind::ActivateByPassphrase,
    CallKind::RunMkfs,
    CallKind::RunFsck,
    CallKind::DirectoryExists,
    CallKind::CreateDirectory,
    CallKind::Mount,
];

#[test]
fn format_runs_every_step_once_in_order() {
    let fixture = VolumeFixture::new(SIZE);
    let mut manager = fixture.manager();
    assert!(manager.is_locked());

    manager
        .format_luks(PASSWORD, FilesystemType::Ext4)
        .expect("format succeeds");

    assert_eq!(fixture.log.calls(), FORMAT_STEPS.to_vec());
    assert!(!manager.is_locked());
    assert_eq!(manager.state(), LockState::Unlocked);
    assert!(fixture.crypto.is_active(CONTAINER_NAME));
    assert_eq!(
        fixture.filesystem.mounted_at(VolumeFixture::mount_point()),
        Some((VolumeFixture::mapped_device(), FilesystemType::Ext4))
    );
    assert_eq!(fixture.crypto.added_passphrases(), vec![PASSWORD.to_vec()]);
}

#[test]
fn format_uses_configured_tool_options() {
    let fixture = VolumeFixture::new(SIZE);
    let mut manager = fixture.manager();
    manager
        .format_luks(PASSWORD, FilesystemType::Ext4)
        .expect("format succeeds");

    let mkfs = fixture.filesystem.mkfs_runs();
    assert_eq!(mkfs.len(), 1);
    assert_eq!(mkfs[0].0, VolumeFixture::mapped_device());
    assert_eq!(
        mkfs[0].2,
        vec!["-E".to_string(), "lazy_itable_init=0,lazy_journal_init=0".to_string()]
    );
    assert_eq!(fixture.filesystem.fsck_runs()[0].2, vec!["-p".to_string()]);

    let params = fixture.crypto.params().expect("header parameters");
    assert_eq!(params.cipher_spec(), "aes-xts-plain64");
    assert_eq!(params.key_size_bits, 512);
}

#[test]
fn format_with_existing_mount_point_skips_creation() {
    let fixture = VolumeFixture::with_existing_mount_point(SIZE);
    let mut manager = fixture.manager();
    manager
        .format_luks(PASSWORD, FilesystemType::Xfs)
        .expect("format succeeds");

    assert_eq!(fixture.log.count(CallKind::CreateDirectory), 0);
    assert_eq!(manager.fs_type(), FilesystemType::Xfs);
}

#[test]
fn failure_at_any_step_leaves_the_volume_locked() {
    let failing = [
        CallKind::Format,
        CallKind::KeyslotAddByVolumeKey,
        CallKind::Load,
        CallKind::ActivateByPassphrase,
        CallKind::RunMkfs,
        CallKind::RunFsck,
        CallKind::CreateDirectory,
        CallKind::Mount,
    ];

    for step in failing {
        let fixture = VolumeFixture::new(SIZE);
        fixture.log.fail_on(step);
        let mut manager = fixture.manager();

        let err = manager
            .format_luks(PASSWORD, FilesystemType::Ext4)
            .expect_err("injected failure");
        assert_eq!(err.kind, StorageErrorKind::InternalFailure, "step {step:?}");
        assert!(err.rollback.is_empty(), "step {step:?}");
        assert!(manager.is_locked(), "step {step:?}");
        assert!(!fixture.crypto.is_active(CONTAINER_NAME), "step {step:?}");
        assert!(
            !fixture.filesystem.has_directory(VolumeFixture::mount_point()),
            "step {step:?}"
        );
    }
}

#[test]
fn failure_before_activation_rolls_nothing_back() {
    for step in [
        CallKind::Format,
        CallKind::KeyslotAddByVolumeKey,
        CallKind::Load,
        CallKind::ActivateByPassphrase,
    ] {
        let fixture = VolumeFixture::new(SIZE);
        fixture.log.fail_on(step);
        let mut manager = fixture.manager();
        manager
            .format_luks(PASSWORD, FilesystemType::Ext4)
            .expect_err("injected failure");

        assert_eq!(fixture.log.count(CallKind::Deactivate), 0, "step {step:?}");
        assert_eq!(fixture.log.calls().last(), Some(&step));
    }
}

#[test]
fn mkfs_failure_deactivates_the_mapping() {
    let fixture = VolumeFixture::new(SIZE);
    fixture.log.fail_on(CallKind::RunMkfs);
    let mut manager = fixture.manager();
    manager
        .format_luks(PASSWORD, FilesystemType::Ext4)
        .expect_err("mkfs fails");

    assert_eq!(
        fixture.log.calls(),
        vec![
            CallKind::Format,
            CallKind::KeyslotAddByVolumeKey,
            CallKind::Load,
            CallKind::ActivateByPassphrase,
            CallKind::RunMkfs,
            CallKind::Deactivate,
        ]
    );
}

#[test]
fn mount_failure_removes_created_directory_then_deactivates() {
    let fixture = VolumeFixture::new(SIZE);
    fixture.log.fail_on(CallKind::Mount);
    let mut manager = fixture.manager();
    manager
        .format_luks(PASSWORD, FilesystemType::Ext4)
        .expect_err("mount fails");

    let calls = fixture.log.calls();
    assert_eq!(
        &calls[calls.len() - 3..],
        &[
            CallKind::Mount,
            CallKind::RemoveDirectory,
            CallKind::Deactivate
        ]
    );
}

#[test]
fn mount_failure_keeps_a_directory_it_did_not_create() {
    let fixture = VolumeFixture::with_existing_mount_point(SIZE);
    fixture.log.fail_on(CallKind::Mount);
    let mut manager = fixture.manager();
    manager
        .format_luks(PASSWORD, FilesystemType::Ext4)
        .expect_err("mount fails");

    assert_eq!(fixture.log.count(CallKind::RemoveDirectory), 0);
    assert_eq!(fixture.log.count(CallKind::Deactivate), 1);
    assert!(fixture.filesystem.has_directory(VolumeFixture::mount_point()));
}

#[test]
fn rollback_failure_is_reported_without_changing_the_kind() {
    let fixture = VolumeFixture::new(SIZE);
    fixture.log.fail_on(CallKind::Mount);
    fixture.log.fail_on(CallKind::RemoveDirectory);
    let mut manager = fixture.manager();

    let err = manager
        .format_luks(PASSWORD, FilesystemType::Ext4)
        .expect_err("mount fails");
    assert_eq!(err.kind, StorageErrorKind::InternalFailure);
    assert_eq!(err.rollback.len(), 1);
    assert!(err.rollback[0].contains("remove_directory"));
    // later undo steps still run
    assert_eq!(fixture.log.count(CallKind::Deactivate), 1);
    assert!(manager.is_locked());
}

#[test]
fn format_while_unlocked_is_refused() {
    let fixture = VolumeFixture::new(SIZE);
    let mut manager = fixture.manager();
    manager
        .format_luks(PASSWORD, FilesystemType::Ext4)
        .expect("first format");
    fixture.log.clear();

    let err = manager
        .format_luks(PASSWORD, FilesystemType::Ext4)
        .expect_err("already unlocked");
    assert_eq!(err.kind, StorageErrorKind::InvalidState);
    assert!(fixture.log.calls().is_empty());
    assert!(!manager.is_locked());
}
