use storage_contracts::StorageErrorKind;
use storage_testing::VolumeFixture;
use storage_types::{ErasePass, EraseRequest, FilesystemType};
use storage_volume::erase::PatternStream;
use storage_volume::settings::DEFAULT_PATTERN_SEED;

const SIZES: [usize; 9] = [1, 7, 8, 9, 4095, 4096, 4097, 3 * 4096 + 5, 65_536];

fn pattern(pass: ErasePass) -> EraseRequest {
    EraseRequest::Pattern { pass, bytes: None }
}

fn zero(pass: ErasePass) -> EraseRequest {
    EraseRequest::Zero { pass, bytes: None }
}

#[test]
fn pattern_write_then_verify_succeeds_for_any_size() {
    for size in SIZES {
        let fixture = VolumeFixture::new(size);
        let manager = fixture.manager();

        let report = manager
            .erase(&pattern(ErasePass::Overwrite))
            .expect("pattern write");
        assert_eq!(report.amount, size as u64);
        manager
            .erase(&pattern(ErasePass::Verify))
            .unwrap_or_else(|err| panic!("verify of {size} bytes: {err}"));
    }
}

#[test]
fn pattern_on_device_matches_the_stream() {
    let fixture = VolumeFixture::new(10_000);
    fixture
        .manager()
        .erase(&pattern(ErasePass::Overwrite))
        .expect("pattern write");

    let mut expected = vec![0u8; 10_000];
    PatternStream::new(DEFAULT_PATTERN_SEED).fill(&mut expected);
    assert_eq!(fixture.device.data(), expected);
}

#[test]
fn pattern_verify_detects_any_corrupted_byte() {
    let size = 3 * 4096 + 5;
    for offset in [0, 1, 4095, 4096, size / 2, size - 1] {
        let fixture = VolumeFixture::new(size);
        let manager = fixture.manager();
        manager
            .erase(&pattern(ErasePass::Overwrite))
            .expect("pattern write");

        let byte = fixture.device.peek(offset);
        fixture.device.poke(offset, byte ^ 0x01);

        let err = manager
            .erase(&pattern(ErasePass::Verify))
            .expect_err("corruption detected");
        assert_eq!(err.kind, StorageErrorKind::EraseError, "offset {offset}");
        assert!(err.message.contains(&offset.to_string()), "{}", err.message);
    }
}

#[test]
fn pattern_verify_of_unwritten_device_fails() {
    let fixture = VolumeFixture::new(4096);
    let err = fixture
        .manager()
        .erase(&pattern(ErasePass::Verify))
        .expect_err("device still holds 0xAA");
    assert_eq!(err.kind, StorageErrorKind::EraseError);
}

#[test]
fn pattern_short_write_is_an_erase_error() {
    let fixture = VolumeFixture::new(8192);
    fixture.device.set_max_transfer(Some(1000));

    let err = fixture
        .manager()
        .erase(&pattern(ErasePass::Overwrite))
        .expect_err("short write");
    assert_eq!(err.kind, StorageErrorKind::EraseError);
    assert_eq!(fixture.device.open_handles(), 0);
}

#[test]
fn pattern_short_read_is_not_retried() {
    let fixture = VolumeFixture::new(8192);
    let manager = fixture.manager();
    manager
        .erase(&pattern(ErasePass::Overwrite))
        .expect("pattern write");
    fixture.device.set_stalls(1);

    let err = manager
        .erase(&pattern(ErasePass::Verify))
        .expect_err("short read");
    assert_eq!(err.kind, StorageErrorKind::EraseError);
}

#[test]
fn pattern_past_the_device_end_fails() {
    let fixture = VolumeFixture::new(4096);
    let err = fixture
        .manager()
        .erase(&EraseRequest::Pattern {
            pass: ErasePass::Overwrite,
            bytes: Some(8192),
        })
        .expect_err("device too small");
    assert_eq!(err.kind, StorageErrorKind::EraseError);
}

#[test]
fn zero_write_then_verify_succeeds_for_any_size() {
    for size in SIZES {
        let fixture = VolumeFixture::new(size);
        let manager = fixture.fast_manager();

        manager
            .erase(&zero(ErasePass::Overwrite))
            .expect("zero write");
        assert!(fixture.device.data().iter().all(|byte| *byte == 0));
        manager
            .erase(&zero(ErasePass::Verify))
            .unwrap_or_else(|err| panic!("verify of {size} bytes: {err}"));
    }
}

#[test]
fn zero_verify_detects_nonzero_at_start_middle_and_end() {
    let size = 3 * 4096 + 5;
    for offset in [0, size / 2, size - 1] {
        let fixture = VolumeFixture::new(size);
        let manager = fixture.fast_manager();
        manager
            .erase(&zero(ErasePass::Overwrite))
            .expect("zero write");
        fixture.device.poke(offset, 0x80);

        let err = manager
            .erase(&zero(ErasePass::Verify))
            .expect_err("nonzero byte");
        assert_eq!(err.kind, StorageErrorKind::InternalFailure, "offset {offset}");
        assert!(err.message.contains(&offset.to_string()), "{}", err.message);
    }
}

#[test]
fn zero_tolerates_short_and_stalled_transfers() {
    let fixture = VolumeFixture::new(3 * 4096 + 5);
    fixture.device.set_max_transfer(Some(700));
    fixture.device.set_stalls(5);
    let manager = fixture.fast_manager();

    manager
        .erase(&zero(ErasePass::Overwrite))
        .expect("zero write with short transfers");
    fixture.device.set_stalls(5);
    manager
        .erase(&zero(ErasePass::Verify))
        .expect("zero verify with short transfers");
    assert!(fixture.device.data().iter().all(|byte| *byte == 0));
}

#[test]
fn zero_gives_up_when_the_retry_budget_runs_out() {
    let fixture = VolumeFixture::new(4096);
    fixture.device.set_stalls(32);

    let err = fixture
        .fast_manager()
        .erase(&zero(ErasePass::Overwrite))
        .expect_err("stalled");
    assert_eq!(err.kind, StorageErrorKind::InternalFailure);
    assert_eq!(fixture.device.open_handles(), 0);
}

#[test]
fn zero_partial_range_leaves_the_rest() {
    let fixture = VolumeFixture::new(8192);
    fixture
        .fast_manager()
        .erase(&EraseRequest::Zero {
            pass: ErasePass::Overwrite,
            bytes: Some(5000),
        })
        .expect("partial zero");

    let data = fixture.device.data();
    assert!(data[..5000].iter().all(|byte| *byte == 0));
    assert!(data[5000..].iter().all(|byte| *byte == 0xAA));
}

#[test]
fn raw_erase_is_refused_while_unlocked() {
    let fixture = VolumeFixture::new(8192);
    let mut manager = fixture.manager();
    manager
        .format_luks(b"pw", FilesystemType::Ext4)
        .expect("format");
    let opens = fixture.device.opens();

    for request in [
        pattern(ErasePass::Overwrite),
        zero(ErasePass::Overwrite),
        EraseRequest::Sanitize {
            bytes: None,
            ext_csd: None,
        },
    ] {
        let err = manager.erase(&request).expect_err("volume is unlocked");
        assert_eq!(err.kind, StorageErrorKind::InvalidState);
    }
    assert_eq!(fixture.device.opens(), opens);

    manager
        .erase(&EraseRequest::VerifyGeometry)
        .expect("geometry check is read-only");
}

#[test]
fn raw_erase_while_unlocked_can_be_allowed() {
    let fixture = VolumeFixture::new(4096);
    let mut settings = storage_volume::VolumeSettings::default();
    settings.erase.require_locked_for_raw_erase = false;
    let mut manager = fixture.manager_with(settings);
    manager
        .format_luks(b"pw", FilesystemType::Ext4)
        .expect("format");

    manager
        .erase(&pattern(ErasePass::Overwrite))
        .expect("allowed by settings");
}

#[test]
fn missing_device_is_resource_not_found() {
    let fixture = VolumeFixture::new(4096);
    let manager = storage_volume::VolumeManager::new(
        storage_types::VolumeIdentity::new("/dev/mmcblk9", "other", "/mnt/other"),
        fixture.bounds,
        fixture.backends(),
        storage_volume::VolumeSettings::default(),
    );

    let err = manager
        .erase(&zero(ErasePass::Overwrite))
        .expect_err("no such device");
    assert_eq!(err.kind, StorageErrorKind::ResourceNotFound);
}

fn geometry_manager(fixture: &VolumeFixture, min: u64, max: u64) -> storage_volume::VolumeManager {
    storage_volume::VolumeManager::new(
        VolumeFixture::identity(),
        storage_types::GeometryBounds::new(min, max),
        fixture.backends(),
        storage_volume::VolumeSettings::default(),
    )
}

#[test]
fn geometry_inside_bounds_reports_the_size() {
    let fixture = VolumeFixture::new(4096);
    let report = geometry_manager(&fixture, 4095, 4097)
        .erase(&EraseRequest::VerifyGeometry)
        .expect("within bounds");
    assert_eq!(report.amount, 4096);
    assert_eq!(fixture.device.data(), vec![0xAA; 4096]);
}

#[test]
fn geometry_outside_bounds_is_rejected() {
    let fixture = VolumeFixture::new(4096);

    let err = geometry_manager(&fixture, 4097, 8192)
        .erase(&EraseRequest::VerifyGeometry)
        .expect_err("device too small");
    assert_eq!(err.kind, StorageErrorKind::GeometryTooSmall);

    let err = geometry_manager(&fixture, 1024, 4095)
        .erase(&EraseRequest::VerifyGeometry)
        .expect_err("device too large");
    assert_eq!(err.kind, StorageErrorKind::GeometryTooLarge);
}

#[test]
fn geometry_size_query_failure_is_internal() {
    let fixture = VolumeFixture::new(4096);
    fixture.device.fail_size_query(true);

    let err = fixture
        .manager()
        .erase(&EraseRequest::VerifyGeometry)
        .expect_err("size query fails");
    assert_eq!(err.kind, StorageErrorKind::InternalFailure);
}

#[test]
fn zero_block_size_is_rejected_before_any_io() {
    let fixture = VolumeFixture::new(4096);
    let mut settings = storage_volume::VolumeSettings::default();
    settings.erase.block_size = 0;
    let manager = fixture.manager_with(settings);

    for request in [
        pattern(ErasePass::Overwrite),
        pattern(ErasePass::Verify),
        zero(ErasePass::Overwrite),
        zero(ErasePass::Verify),
    ] {
        let err = manager.erase(&request).expect_err("block size 0");
        assert_eq!(err.kind, StorageErrorKind::InternalFailure);
    }
    assert_eq!(fixture.device.opens(), 0);
}

#[test]
fn overwrites_flush_the_device_once() {
    let fixture = VolumeFixture::new(3 * 4096 + 5);
    let manager = fixture.fast_manager();

    manager
        .erase(&pattern(ErasePass::Overwrite))
        .expect("pattern write");
    assert_eq!(fixture.device.syncs(), 1);
    manager
        .erase(&pattern(ErasePass::Verify))
        .expect("pattern verify");
    assert_eq!(fixture.device.syncs(), 1);

    manager
        .erase(&zero(ErasePass::Overwrite))
        .expect("zero write");
    assert_eq!(fixture.device.syncs(), 2);
}

#[test]
fn deferred_write_errors_fail_the_erase() {
    let fixture = VolumeFixture::new(8192);
    fixture.device.fail_sync(true);
    let manager = fixture.fast_manager();

    let err = manager
        .erase(&pattern(ErasePass::Overwrite))
        .expect_err("flush fails");
    assert_eq!(err.kind, StorageErrorKind::EraseError);

    let err = manager
        .erase(&zero(ErasePass::Overwrite))
        .expect_err("flush fails");
    assert_eq!(err.kind, StorageErrorKind::InternalFailure);
    assert_eq!(fixture.device.open_handles(), 0);
}
