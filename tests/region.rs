// Named shared-memory region tests against the real OS primitive.
// Run with: cargo test --test region -- --nocapture

#![cfg(target_os = "linux")]

use serial_test::serial;
use shmq::core::region::{Acl, Region};
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name(tag: &str) -> String {
    format!(
        "/shmq_test_{}_{}_{}",
        std::process::id(),
        tag,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

#[test]
#[serial]
fn create_then_open_see_the_same_bytes() {
    let name = unique_name("region_rw");
    let writer = Region::create(&name, 4096, Acl::default()).unwrap();
    unsafe {
        let slice = std::slice::from_raw_parts_mut(writer.as_ptr(), writer.size());
        slice[0] = 0x42;
        slice[100] = 0xAA;
    }

    let reader = Region::open(&name, 4096).unwrap();
    unsafe {
        let slice = std::slice::from_raw_parts(reader.as_ptr(), reader.size());
        assert_eq!(slice[0], 0x42);
        assert_eq!(slice[100], 0xAA);
    }

    drop(writer);
    drop(reader);
    Region::unlink(&name).ok();
}

#[test]
#[serial]
fn create_is_zero_initialized() {
    let name = unique_name("region_zero");
    let region = Region::create(&name, 1024, Acl::default()).unwrap();
    unsafe {
        let slice = std::slice::from_raw_parts(region.as_ptr(), region.size());
        assert!(slice.iter().all(|&b| b == 0));
    }
    drop(region);
    Region::unlink(&name).ok();
}

#[test]
#[serial]
fn create_twice_with_the_same_name_fails() {
    let name = unique_name("region_dup");
    let first = Region::create(&name, 4096, Acl::default()).unwrap();
    let second = Region::create(&name, 4096, Acl::default());
    assert!(second.is_err());
    drop(first);
    Region::unlink(&name).ok();
}

#[test]
#[serial]
fn open_missing_name_reports_does_not_exist() {
    let name = unique_name("region_missing");
    let result = Region::open(&name, 4096);
    assert!(result.is_err());
}
