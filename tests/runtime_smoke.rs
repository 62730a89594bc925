use std::time::Duration;

use classsync::{
    assets::{ObjectResult, ObjectStore, UpsertPolicy, memory::MemoryObjectStore},
    node::{ClassroomTree, ModuleNode, NodeHeader},
    persist::sqlite::SqliteContentStore,
    record::ClassroomInfo,
    runtime::{
        events::SyncEvent,
        handle::{RuntimeConfig, RuntimeError, spawn_syncer},
    },
    types::{NodeId, RowId},
};

fn seeded_store() -> (SqliteContentStore, RowId) {
    let mut store = SqliteContentStore::open_in_memory().expect("open sqlite");
    let classroom = store
        .create_classroom(&ClassroomInfo::default(), true)
        .expect("classroom");
    (store, classroom)
}

fn one_module(classroom: RowId, temp: &str) -> ClassroomTree {
    let mut tree = ClassroomTree::new(classroom);
    tree.modules.push(ModuleNode {
        header: NodeHeader::new(NodeId::parse(temp).expect("id"), 0),
        name: "Intro".to_string(),
        description: String::new(),
        lessons: Vec::new(),
    });
    tree
}

struct SlowUploads {
    delay: Duration,
}

impl ObjectStore for SlowUploads {
    fn upload(&mut self, _: &str, _: &[u8], _: &str, _: UpsertPolicy) -> ObjectResult<()> {
        std::thread::sleep(self.delay);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("slow://{path}")
    }
}

#[tokio::test]
async fn runtime_sync_load_and_events_ordered() {
    let (store, classroom) = seeded_store();
    let handle = spawn_syncer(
        Box::new(store),
        Box::new(MemoryObjectStore::default()),
        RuntimeConfig::default(),
    );
    let mut sub = handle.subscribe();

    let mut tree = one_module(classroom, "m-tmp-1");
    let report = handle.sync(tree.clone()).await.expect("sync");
    assert_eq!(report.modules.inserted, 1);

    let stored = handle.load(classroom).await.expect("load").expect("classroom");
    assert_eq!(stored.modules.len(), 1);
    assert_eq!(stored.modules[0].record.fields.name, "Intro");

    tree.promote(&report);
    let again = handle.sync(tree).await.expect("resync");
    assert!(again.is_noop());

    let mut seen = Vec::new();
    for _ in 0..2 {
        let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("event")
            .expect("recv");
        seen.push(evt);
    }
    assert_eq!(
        seen[0],
        SyncEvent::Synced {
            classroom_id: classroom,
            report
        }
    );
    assert_eq!(
        seen[1],
        SyncEvent::Synced {
            classroom_id: classroom,
            report: again
        }
    );

    handle.shutdown().await.expect("shutdown");
    assert!(matches!(
        handle.load(classroom).await,
        Err(RuntimeError::ChannelClosed)
    ));
}

#[tokio::test]
async fn failed_sync_is_reported_to_caller_and_subscribers() {
    let (store, _) = seeded_store();
    let handle = spawn_syncer(
        Box::new(store),
        Box::new(MemoryObjectStore::default()),
        RuntimeConfig::default(),
    );
    let mut sub = handle.subscribe();

    let err = handle
        .sync(ClassroomTree::new(4242))
        .await
        .expect_err("unknown classroom");
    assert_eq!(err.status_code(), 404);
    assert_eq!(err.kind(), "NotFound");

    let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .expect("event")
        .expect("recv");
    assert!(matches!(
        evt,
        SyncEvent::SyncFailed {
            classroom_id: 4242,
            kind: "NotFound",
            ..
        }
    ));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn slow_sync_times_out_and_later_commands_still_run() {
    let (store, classroom) = seeded_store();
    let config = RuntimeConfig {
        sync_timeout_ms: 50,
        ..RuntimeConfig::default()
    };
    let handle = spawn_syncer(
        Box::new(store),
        Box::new(SlowUploads {
            delay: Duration::from_millis(300),
        }),
        config,
    );

    let mut tree = one_module(classroom, "m-tmp-1");
    tree.cover = Some("data:image/png;base64,iVBORw0KGgo=".to_string().try_into().expect("asset"));
    let err = handle.sync(tree).await.expect_err("timeout");
    assert!(matches!(err, RuntimeError::TimedOut(50)));
    assert_eq!(err.status_code(), 504);

    // The timed-out pass still completes before the next command.
    let stored = handle.load(classroom).await.expect("load").expect("classroom");
    assert_eq!(
        stored.classroom.cover_url.as_deref(),
        Some(format!("slow://classrooms/{classroom}/cover.png").as_str())
    );
    assert_eq!(stored.modules.len(), 1);

    handle.shutdown().await.expect("shutdown");
}
