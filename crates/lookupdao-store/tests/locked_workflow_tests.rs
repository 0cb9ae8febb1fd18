// Integration tests for locked workflows
// Covers single and batch workflows, atomicity, cascades and lock contention

mod common;

use common::{open_store, saved_parent, SomeLookupObject, SomeRelatedLookupObject};
use lookupdao_core::{DaoError, DaoErrorKind};
use lookupdao_store::{DataStore, QueryParams};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn has_name(parent: &SomeLookupObject) -> bool {
    parent.name.is_some()
}

fn children_of(store: &DataStore, parent: &SomeLookupObject) -> Vec<SomeRelatedLookupObject> {
    store
        .lookup_dao::<SomeRelatedLookupObject>()
        .unwrap()
        .lookup_multi(&parent.my_id)
        .unwrap()
}

#[test]
fn test_workflow_mutates_parent_and_saves_child() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let children = store.lookup_dao::<SomeRelatedLookupObject>().unwrap();
    let parent = saved_parent(&store, "parent-1", Some("Parent"));

    // When: the workflow filters, cascades a child and renames the parent
    let result = parents
        .lock_and_get_executor(parent.id)
        .filter(has_name)
        .save(&children, |p| SomeRelatedLookupObject::for_parent(p, "child"))
        .mutate(|p| p.name = Some("Changed".to_string()))
        .execute()
        .unwrap();

    // Then: both changes are committed together
    assert_eq!(result.name.as_deref(), Some("Changed"));
    assert_eq!(
        parents.get(parent.id).unwrap().unwrap().name.as_deref(),
        Some("Changed")
    );
    assert_eq!(children_of(&store, &parent).len(), 1);
}

#[test]
fn test_failed_filter_commits_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let children = store.lookup_dao::<SomeRelatedLookupObject>().unwrap();
    let parent = saved_parent(&store, "parent-1", None);

    let err = parents
        .lock_and_get_executor(parent.id)
        .mutate(|p| p.name = Some("Changed".to_string()))
        .save(&children, |p| SomeRelatedLookupObject::for_parent(p, "child"))
        .filter(has_name)
        .filter(|_| false)
        .execute()
        .unwrap_err();

    assert_eq!(err.kind(), DaoErrorKind::Validation);
    assert!(err.to_string().contains("Predicate check failed"));
    assert_eq!(parents.get(parent.id).unwrap().unwrap().name, None);
    assert!(children_of(&store, &parent).is_empty());
}

#[test]
fn test_filter_or_returns_supplied_error() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let parent = saved_parent(&store, "parent-1", None);

    let err = parents
        .lock_and_get_executor(parent.id)
        .filter_or(has_name, DaoError::validation("parent must be named"))
        .execute()
        .unwrap_err();

    assert!(err.to_string().contains("parent must be named"));
}

#[test]
fn test_failing_step_rolls_back_cascaded_child() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let children = store.lookup_dao::<SomeRelatedLookupObject>().unwrap();
    let parent = saved_parent(&store, "parent-1", Some("Parent"));

    let err = parents
        .lock_and_get_executor(parent.id)
        .save(&children, |p| SomeRelatedLookupObject::for_parent(p, "child"))
        .apply(|_| Err(DaoError::validation("abort")))
        .execute()
        .unwrap_err();

    assert_eq!(err.kind(), DaoErrorKind::Validation);
    assert!(children_of(&store, &parent).is_empty());
}

#[test]
fn test_missing_target_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();

    let err = parents.lock_and_get_executor(404).execute().unwrap_err();

    assert_eq!(err.kind(), DaoErrorKind::NotFound);
    assert!(err.to_string().contains("404"));
}

#[test]
fn test_insert_workflow_persists_parent_and_child() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let children = store.lookup_dao::<SomeRelatedLookupObject>().unwrap();

    let parent = parents
        .save_and_get_executor(SomeLookupObject {
            id: 0,
            my_id: "fresh".to_string(),
            name: Some("Fresh".to_string()),
        })
        .save_all(&children, |p| {
            vec![
                SomeRelatedLookupObject::for_parent(p, "a"),
                SomeRelatedLookupObject::for_parent(p, "b"),
            ]
        })
        .execute()
        .unwrap();

    assert!(parent.id > 0);
    assert!(parents.exists_key("fresh").unwrap());
    assert_eq!(children_of(&store, &parent).len(), 2);
}

#[test]
fn test_cascaded_child_update() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let children = store.lookup_dao::<SomeRelatedLookupObject>().unwrap();
    let parent = saved_parent(&store, "parent-1", Some("Parent"));
    let child = children
        .save(SomeRelatedLookupObject::for_parent(&parent, "before"))
        .unwrap();

    parents
        .lock_and_get_executor(parent.id)
        .update(&children, child.id, |c| {
            c.map(|mut c| {
                c.value = "after".to_string();
                c
            })
        })
        .update_query(
            &children,
            "update SomeRelatedLookupObject c set c.value = :value where c.parentId = :parent",
            QueryParams::new()
                .with("value", "bulk".to_string())
                .with("parent", "parent-1".to_string()),
        )
        .execute()
        .unwrap();

    assert_eq!(children.get(child.id).unwrap().unwrap().value, "bulk");
}

#[test]
fn test_cascaded_update_query_without_rows_aborts() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let children = store.lookup_dao::<SomeRelatedLookupObject>().unwrap();
    let parent = saved_parent(&store, "parent-1", Some("Parent"));

    let err = parents
        .lock_and_get_executor(parent.id)
        .mutate(|p| p.name = Some("Changed".to_string()))
        .update_query(
            &children,
            "update SomeRelatedLookupObject set value = :value where parentId = :parent",
            QueryParams::new()
                .with("value", "x".to_string())
                .with("parent", "nobody".to_string()),
        )
        .execute()
        .unwrap_err();

    assert_eq!(err.kind(), DaoErrorKind::Validation);
    assert!(err.to_string().contains("Update operation returned result 0"));
    assert_eq!(
        parents.get(parent.id).unwrap().unwrap().name.as_deref(),
        Some("Parent")
    );
}

#[test]
fn test_batch_workflow_mutates_every_row() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let a = saved_parent(&store, "a", None);
    let b = saved_parent(&store, "b", None);

    let batch = parents
        .lock_and_get_batch_executor(vec![b.id, a.id])
        .mutate(|batch| {
            for p in batch.iter_mut() {
                p.name = Some(format!("renamed-{}", p.my_id));
            }
        })
        .execute()
        .unwrap();

    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].id, b.id);
    assert_eq!(
        parents.get(a.id).unwrap().unwrap().name.as_deref(),
        Some("renamed-a")
    );
    assert_eq!(
        parents.get(b.id).unwrap().unwrap().name.as_deref(),
        Some("renamed-b")
    );
}

#[test]
fn test_batch_workflow_lists_missing_ids() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let a = saved_parent(&store, "a", None);

    let err = parents
        .lock_and_get_batch_executor_from(|| vec![a.id, 77, 78, 77])
        .mutate(|batch| batch[0].name = Some("never".to_string()))
        .execute()
        .unwrap_err();

    assert_eq!(err.kind(), DaoErrorKind::NotFound);
    assert!(err.to_string().contains("[77, 78]"));
    assert_eq!(parents.get(a.id).unwrap().unwrap().name, None);
}

#[test]
fn test_batch_save_all_with_post_persist() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let children = store.lookup_dao::<SomeRelatedLookupObject>().unwrap();
    let a = saved_parent(&store, "a", None);
    let b = saved_parent(&store, "b", None);

    parents
        .lock_and_get_batch_executor(vec![a.id, b.id])
        .save_all(
            &children,
            |batch| {
                batch
                    .iter()
                    .map(|p| SomeRelatedLookupObject::for_parent(p, "child"))
                    .collect()
            },
            |saved, batch| {
                for (parent, child) in batch.iter_mut().zip(saved) {
                    parent.name = Some(format!("child-{}", child.id));
                }
            },
        )
        .execute()
        .unwrap();

    let child_of_a = &children_of(&store, &a)[0];
    assert_eq!(
        parents.get(a.id).unwrap().unwrap().name,
        Some(format!("child-{}", child_of_a.id))
    );
    assert_eq!(children_of(&store, &b).len(), 1);
}

#[test]
fn test_batch_insert_with_save_single() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let children = store.lookup_dao::<SomeRelatedLookupObject>().unwrap();
    let staged = vec![
        SomeLookupObject {
            my_id: "x".to_string(),
            ..SomeLookupObject::default()
        },
        SomeLookupObject {
            my_id: "y".to_string(),
            ..SomeLookupObject::default()
        },
    ];

    let batch = parents
        .save_all_and_get_executor(staged)
        .save_single(
            &children,
            |batch| Some(SomeRelatedLookupObject::for_parent(&batch[0], "only")),
            |saved, batch| {
                batch[1].name = saved.map(|c| c.value.clone());
            },
        )
        .save_single(
            &children,
            |_| None,
            |saved, _| assert!(saved.is_none()),
        )
        .execute()
        .unwrap();

    assert!(batch.iter().all(|p| p.id > 0));
    assert_eq!(children_of(&store, &batch[0]).len(), 1);
    assert_eq!(
        parents.lookup("y").unwrap().unwrap().name.as_deref(),
        Some("only")
    );
}

#[test]
fn test_second_update_in_lock_fails_fast() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let id = saved_parent(&store, "contended", Some("Parent")).id;
    let dao = &parents;
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|s| {
        let holder = s.spawn(move || {
            dao.update_in_lock(id, move |p| {
                locked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                p.map(|mut p| {
                    p.name = Some("holder".to_string());
                    p
                })
            })
        });
        locked_rx.recv().unwrap();

        // When: a second caller contends for the same row
        let started = Instant::now();
        let err = dao.update_in_lock(id, |p| p).unwrap_err();
        let workflow_err = dao.lock_and_get_executor(id).execute().unwrap_err();

        // Then: it fails at once instead of blocking
        assert_eq!(err.kind(), DaoErrorKind::LockNotAvailable);
        assert_eq!(workflow_err.kind(), DaoErrorKind::LockNotAvailable);
        assert!(started.elapsed() < Duration::from_secs(1));

        release_tx.send(()).unwrap();
        assert!(holder.join().unwrap().unwrap());
    });

    assert_eq!(
        parents.get(id).unwrap().unwrap().name.as_deref(),
        Some("holder")
    );
}

#[test]
fn test_plain_update_waits_for_workflow_lock() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let id = saved_parent(&store, "queued", Some("start")).id;
    let dao = &parents;
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|s| {
        let holder = s.spawn(move || {
            dao.lock_and_get_executor(id)
                .mutate(move |p| {
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    p.name = Some("first".to_string());
                })
                .execute()
        });
        locked_rx.recv().unwrap();

        let writer = s.spawn(move || {
            dao.update(id, |p| {
                p.map(|mut p| {
                    p.name = p.name.map(|n| format!("{}+second", n));
                    p
                })
            })
        });
        thread::sleep(Duration::from_millis(200));
        assert!(!writer.is_finished());

        release_tx.send(()).unwrap();
        holder.join().unwrap().unwrap();
        assert!(writer.join().unwrap().unwrap());
    });

    assert_eq!(
        parents.get(id).unwrap().unwrap().name.as_deref(),
        Some("first+second")
    );
}

#[test]
fn test_update_in_lock_on_different_rows_both_succeed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let a = saved_parent(&store, "row-a", Some("a")).id;
    let b = saved_parent(&store, "row-b", Some("b")).id;
    let c = saved_parent(&store, "row-c", Some("c")).id;
    let dao = &parents;
    let (read_tx, read_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|s| {
        // Given: a unit of work paused after reading row a
        let first = s.spawn(move || {
            dao.update_in_lock(a, move |p| {
                read_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                p.map(|mut p| {
                    p.name = Some("a-updated".to_string());
                    p
                })
            })
        });
        read_rx.recv().unwrap();

        // When: other callers lock rows b and c meanwhile
        let second = s.spawn(move || {
            dao.update_in_lock(b, |p| {
                p.map(|mut p| {
                    p.name = Some("b-updated".to_string());
                    p
                })
            })
        });
        let workflow = s.spawn(move || {
            dao.lock_and_get_executor(c)
                .mutate(|p| p.name = p.name.take().map(|n| format!("{}!", n)))
                .execute()
        });
        thread::sleep(Duration::from_millis(100));
        release_tx.send(()).unwrap();

        // Then: neither row was contended, so every caller succeeds
        assert!(first.join().unwrap().unwrap());
        assert!(second.join().unwrap().unwrap());
        workflow.join().unwrap().unwrap();
    });

    assert_eq!(
        parents.get(a).unwrap().unwrap().name.as_deref(),
        Some("a-updated")
    );
    assert_eq!(
        parents.get(b).unwrap().unwrap().name.as_deref(),
        Some("b-updated")
    );
    assert_eq!(parents.get(c).unwrap().unwrap().name.as_deref(), Some("c!"));
}

#[test]
fn test_plain_update_beside_workflow_on_another_row() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let parents = store.lookup_dao::<SomeLookupObject>().unwrap();
    let locked = saved_parent(&store, "locked", Some("l")).id;
    let other = saved_parent(&store, "other", Some("o")).id;
    let dao = &parents;
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|s| {
        let holder = s.spawn(move || {
            dao.lock_and_get_executor(locked)
                .mutate(move |p| {
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    p.name = Some("workflow".to_string());
                })
                .execute()
        });
        locked_rx.recv().unwrap();

        let writer = s.spawn(move || {
            dao.update(other, |p| {
                p.map(|mut p| {
                    p.name = Some("plain".to_string());
                    p
                })
            })
        });
        thread::sleep(Duration::from_millis(100));
        release_tx.send(()).unwrap();

        holder.join().unwrap().unwrap();
        assert!(writer.join().unwrap().unwrap());
    });

    assert_eq!(
        parents.get(locked).unwrap().unwrap().name.as_deref(),
        Some("workflow")
    );
    assert_eq!(
        parents.get(other).unwrap().unwrap().name.as_deref(),
        Some("plain")
    );
}
