use drift_core::{Delta, DeltaOrigin, Error, Operation, Row, RowKey};
use drift_source::{DeltaStream, WorkerStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn insert(id: u64, n: i64) -> Delta {
    let origin = DeltaOrigin::now("test://source");
    let mut row = Row::new();
    row.insert("id".into(), n.into());
    Delta::insert(id, &origin, "t", RowKey::Columns(vec![("id".into(), n.into())]), row)
}

#[tokio::test]
async fn test_yields_deltas_in_order_then_ends() {
    let mut stream = WorkerStream::spawn("test://source", 2, |mut tx| async move {
        for n in 0..5 {
            let id = tx.next_id();
            if !tx.send(insert(id, n)).await {
                break;
            }
        }
        Ok(())
    });

    let mut ids = Vec::new();
    while let Some(item) = stream.next().await {
        ids.push(item.unwrap().id);
    }
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stop_drains_fetched_deltas_and_ends_fetching() {
    let fetched = Arc::new(AtomicU64::new(0));
    let counter = fetched.clone();
    let mut stream = WorkerStream::spawn("test://source", 4, move |mut tx| async move {
        let mut n = 0;
        loop {
            if tx.is_stopped() {
                break;
            }
            counter.fetch_add(1, Ordering::SeqCst);
            let id = tx.next_id();
            if !tx.send(insert(id, n)).await {
                break;
            }
            n += 1;
            if !tx.pause(Duration::from_millis(1)).await {
                break;
            }
        }
        Ok(())
    });

    // take a couple, then stop
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.operation, Operation::Insert);
    stream.stop().await.unwrap();

    let mut rest = 0;
    while let Some(item) = stream.next().await {
        item.unwrap();
        rest += 1;
    }
    let total = fetched.load(Ordering::SeqCst);
    assert_eq!(rest + 1, total);

    // nothing new after stop returned
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fetched.load(Ordering::SeqCst), total);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_fetch_error_is_final_item() {
    let mut stream = WorkerStream::spawn("test://source", 8, |mut tx| async move {
        let id = tx.next_id();
        tx.send(insert(id, 1)).await;
        Err(Error::stream(
            tx.source_name(),
            Some("t".to_string()),
            "replication slot dropped",
        ))
    });

    assert!(stream.next().await.unwrap().is_ok());
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Stream { ref table, .. } if table.as_deref() == Some("t")));
    assert_eq!(err.source_name(), "test://source");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_worker_panic_surfaces_as_stream_error() {
    let mut stream = WorkerStream::spawn("test://source", 1, |_tx| async move {
        if true {
            panic!("decoder blew up");
        }
        Ok(())
    });
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Stream { .. }));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_next_is_cancel_safe() {
    let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();
    let mut stream = WorkerStream::spawn("test://source", 1, |mut tx| async move {
        let _ = go_rx.await;
        let id = tx.next_id();
        tx.send(insert(id, 7)).await;
        Ok(())
    });

    let timed_out = tokio::time::timeout(Duration::from_millis(10), stream.next()).await;
    assert!(timed_out.is_err());

    go_tx.send(()).unwrap();
    let delta = stream.next().await.unwrap().unwrap();
    assert_eq!(delta.id, 1);
}

#[tokio::test]
async fn test_stop_on_exhausted_stream_is_harmless() {
    let mut stream = WorkerStream::spawn("test://source", 1, |_tx| async move { Ok(()) });
    assert!(stream.next().await.is_none());
    stream.stop().await.unwrap();
    stream.stop().await.unwrap();
    assert!(stream.next().await.is_none());
}
