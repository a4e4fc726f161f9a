// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::record::RecordStatus;
use crate::test_support::{pull_request, session};
use crate::ImageRecord;

#[yare::parameterized(
    both_empty = { &[], &[], true },
    same_order = { &[1, 2, 3], &[1, 2, 3], true },
    permuted = { &[1, 2, 3], &[2, 1, 3], true },
    different_len = { &[1, 2], &[1, 2, 3], false },
    disjoint = { &[1], &[2], false },
    one_empty = { &[], &[7], false },
)]
fn same_ids_cases(a: &[u32], b: &[u32], expected: bool) {
    assert_eq!(same_ids(a, b), expected);
    assert_eq!(same_ids(b, a), expected);
}

#[test]
fn with_caller_folds_id_into_nonempty_acl() {
    assert_eq!(with_caller(&[1001], 100), vec![1001, 100]);
    assert_eq!(with_caller(&[100, 1001], 100), vec![100, 1001]);
}

#[test]
fn with_caller_leaves_empty_acl_public() {
    assert!(with_caller(&[], 100).is_empty());
}

fn record_with_acls(user_acl: &[u32], group_acl: &[u32]) -> ImageRecord {
    let mut record = ImageRecord::new_pull(&pull_request("t"), None);
    record.status = RecordStatus::Ready;
    record.user_acl = user_acl.to_vec();
    record.group_acl = group_acl.to_vec();
    record
}

#[test]
fn read_permitted_when_public() {
    let caller = session("user", 100, 100);
    assert!(check_read(&caller, &record_with_acls(&[], &[])));
}

#[test]
fn read_permitted_when_explicitly_not_private() {
    let caller = session("user", 100, 100);
    let mut record = record_with_acls(&[999], &[999]);
    record.private = Some(false);
    assert!(check_read(&caller, &record));
}

#[test]
fn read_checks_uid_and_gid_membership() {
    let caller = session("user", 100, 200);
    assert!(check_read(&caller, &record_with_acls(&[100], &[])));
    assert!(check_read(&caller, &record_with_acls(&[], &[200])));
    assert!(check_read(&caller, &record_with_acls(&[999], &[200])));
    assert!(!check_read(&caller, &record_with_acls(&[999], &[999])));
}
