// Dispatcher protocol exercised with in-process workers over the real
// queue server. Remote ssh launch is not covered here; workers connect the
// same way a remotely started process would.
use std::io::Cursor;
use std::time::Duration;

use passmill::bullpen::{Bullpen, DispatcherContext, LaunchOptions};
use passmill::challenge::Sha256Challenge;
use passmill::mangle::ManglingEngine;
use passmill::model::Glossary;
use passmill::worker::run_worker;

fn test_glossary() -> Glossary {
    Glossary::from_reader(Cursor::new("4 pass\n4 word\n"), "test").expect("glossary")
}

fn spawn_worker(
    addr: String,
    authkey: String,
    queue_id: String,
    label: &str,
    target: &str,
) -> tokio::task::JoinHandle<()> {
    let label = label.to_string();
    let expected = Sha256Challenge::digest_b64("", target, "");
    tokio::spawn(async move {
        let glossary = test_glossary();
        let engine = ManglingEngine::leet_speak();
        let check = Sha256Challenge::new("", "", &expected).expect("digest");
        let _ = run_worker(
            addr.as_str(),
            &authkey,
            &queue_id,
            &label,
            &glossary,
            &engine,
            &check,
        )
        .await;
    })
}

#[tokio::test]
async fn dispatches_tasks_and_quiesces() {
    let ctx = DispatcherContext::bootstrap("127.0.0.1:0", "127.0.0.1")
        .await
        .expect("bootstrap");
    let mut bullpen = Bullpen::new(
        &ctx,
        vec!["alpha".to_string(), "beta".to_string()],
        LaunchOptions::default(),
    )
    .await
    .expect("bullpen");

    for label in ["alpha", "beta"] {
        let _ = spawn_worker(
            ctx.local_client_addr(),
            ctx.authkey().to_string(),
            bullpen.queue_id().to_string(),
            label,
            "p4ss!",
        );
    }

    let mut feed = bullpen.result_feed().await.expect("feed");
    bullpen.enqueue("|L4|").await.expect("enqueue");

    let result = tokio::time::timeout(Duration::from_secs(30), feed.next_result())
        .await
        .expect("result before timeout")
        .expect("result");
    assert_eq!(result.solution.as_deref(), Some("p4ss!"));
    assert!(result.attempts >= 1);

    bullpen.kill_workers().await.expect("kill");
    // Keep draining TERM announcements while join polls the count down.
    let drain = tokio::spawn(async move {
        let _ = feed.next_result().await;
    });
    bullpen.join(Duration::from_secs(30)).await.expect("join");
    assert_eq!(bullpen.running_workers(), 0);
    drain.abort();
    ctx.shutdown();
}

#[tokio::test]
async fn refuses_new_bullpens_after_launch() {
    let ctx = DispatcherContext::bootstrap("127.0.0.1:0", "127.0.0.1")
        .await
        .expect("bootstrap");
    let mut bullpen = Bullpen::new(&ctx, Vec::new(), LaunchOptions::default())
        .await
        .expect("bullpen");

    assert_eq!(bullpen.launch_workers().await.expect("launch"), 0);
    assert!(bullpen.launch_workers().await.is_err());
    assert!(Bullpen::new(&ctx, Vec::new(), LaunchOptions::default())
        .await
        .is_err());
    ctx.shutdown();
}

#[tokio::test]
async fn join_times_out_on_a_silent_worker() {
    let ctx = DispatcherContext::bootstrap("127.0.0.1:0", "127.0.0.1")
        .await
        .expect("bootstrap");
    let bullpen = Bullpen::new(&ctx, vec!["ghost".to_string()], LaunchOptions::default())
        .await
        .expect("bullpen");

    // A worker that starts but never receives TERM leaves the count at one.
    let _ = spawn_worker(
        ctx.local_client_addr(),
        ctx.authkey().to_string(),
        bullpen.queue_id().to_string(),
        "ghost",
        "unreachable",
    );
    let mut feed = bullpen.result_feed().await.expect("feed");
    let drain = tokio::spawn(async move {
        let _ = feed.next_result().await;
    });

    // Give the start announcement time to flow through the feed.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bullpen.running_workers(), 1);
    assert!(bullpen.join(Duration::from_millis(300)).await.is_err());
    drain.abort();
    ctx.shutdown();
}

#[tokio::test]
async fn queue_ids_are_unique_per_context() {
    let ctx = DispatcherContext::bootstrap("127.0.0.1:0", "127.0.0.1")
        .await
        .expect("bootstrap");
    let a = Bullpen::new(&ctx, Vec::new(), LaunchOptions::default())
        .await
        .expect("bullpen a");
    let b = Bullpen::new(&ctx, Vec::new(), LaunchOptions::default())
        .await
        .expect("bullpen b");
    assert_ne!(a.queue_id(), b.queue_id());
    assert_eq!(a.queue_id().len(), 8);
    assert!(a.queue_id().chars().all(|c| c.is_ascii_alphabetic()));
    ctx.shutdown();
}
