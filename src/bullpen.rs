//! The dispatcher: owns the queue server, launches workers on remote
//! hosts, feeds them tasks, and aggregates their reports.
//!
//! One [`DispatcherContext`] is bootstrapped per run and owns the shared
//! secret and the queue server; [`Bullpen`] instances register queue pairs
//! on it and hold non-owning references, so the context must outlive them.
//! Result consumption happens on a separate [`ResultFeed`] connection so a
//! background task can drain reports while the main task keeps feeding.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::protocol::{result_queue_name, task_queue_name, Report, Task, TaskResult};
use crate::queue::{QueueClient, QueueServer};
use crate::Error;

/// Environment variable carrying the shared secret to workers.
pub const AUTHKEY_ENV: &str = "BULLPEN_AUTHKEY";

/// Length of the generated shared secret.
const AUTHKEY_LEN: usize = 64;

/// Length of a queue id.
const QUEUE_ID_LEN: usize = 8;

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

fn random_letters(len: usize) -> String {
    const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

/// Per-run dispatcher state: the shared secret, the queue server, and the
/// once-only launch gate.
///
/// Bootstrapping binds the server immediately; a second bootstrap against
/// the same address fails, which is the once-per-process rule in practice.
pub struct DispatcherContext {
    authkey: String,
    server: QueueServer,
    advertise_host: String,
    launched: AtomicBool,
    id_history: Mutex<HashSet<String>>,
}

impl DispatcherContext {
    /// Generate the shared secret, bind the queue server on `bind_addr`,
    /// and start serving. `advertise_host` is the name remote workers dial
    /// back to, typically this machine's FQDN.
    pub async fn bootstrap(
        bind_addr: &str,
        advertise_host: impl Into<String>,
    ) -> Result<DispatcherContext, Error> {
        let authkey = random_letters(AUTHKEY_LEN);
        let server = QueueServer::bind(bind_addr, &authkey)
            .await
            .map_err(|e| Error::Bootstrap(format!("cannot bind {bind_addr}: {e}")))?;
        info!(addr = %server.local_addr(), "queue server started");
        Ok(DispatcherContext {
            authkey,
            server,
            advertise_host: advertise_host.into(),
            launched: AtomicBool::new(false),
            id_history: Mutex::new(HashSet::new()),
        })
    }

    pub fn authkey(&self) -> &str {
        &self.authkey
    }

    /// Port the queue server is listening on.
    pub fn port(&self) -> u16 {
        self.server.local_addr().port()
    }

    /// Address for clients on this machine. Falls back to loopback when the
    /// server is bound to the unspecified address.
    pub fn local_client_addr(&self) -> String {
        let addr = self.server.local_addr();
        if addr.ip().is_unspecified() {
            format!("127.0.0.1:{}", addr.port())
        } else {
            addr.to_string()
        }
    }

    /// Address remote workers dial.
    pub fn worker_addr(&self) -> String {
        format!("{}:{}", self.advertise_host, self.port())
    }

    /// Stop the queue server. Workers still connected will see their
    /// transport drop and exit.
    pub fn shutdown(&self) {
        self.server.shutdown();
    }

    fn launched(&self) -> bool {
        self.launched.load(Ordering::SeqCst)
    }

    fn mark_launched(&self) {
        self.launched.store(true, Ordering::SeqCst);
    }

    /// Rejection-sample a random alphabetic string unique within this
    /// context's lifetime.
    async fn unique_random_string(&self, len: usize) -> String {
        let mut history = self.id_history.lock().await;
        loop {
            let s = random_letters(len);
            if history.insert(s.clone()) {
                return s;
            }
        }
    }
}

/// Knobs for the remote bootstrap script.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Challenge spec path passed to the worker entry point.
    pub challenge_path: String,
    /// Worker executable invoked on the remote host.
    pub worker_bin: String,
    /// Remote working directory; defaults to this process's cwd.
    pub remote_cwd: Option<String>,
    /// Environment file to `source` before starting the worker.
    pub activate: Option<String>,
    /// ssh login user.
    pub user: Option<String>,
    /// ssh identity file.
    pub identity_file: Option<String>,
}

impl Default for LaunchOptions {
    fn default() -> LaunchOptions {
        LaunchOptions {
            challenge_path: "challenge.json".to_string(),
            worker_bin: "passmill-worker".to_string(),
            remote_cwd: None,
            activate: None,
            user: None,
            identity_file: None,
        }
    }
}

/// A registered queue pair plus the hosts feeding from it.
pub struct Bullpen<'a> {
    ctx: &'a DispatcherContext,
    hosts: Vec<String>,
    opts: LaunchOptions,
    queue_id: String,
    task_queue: String,
    result_queue: String,
    task_client: QueueClient,
    running: Arc<AtomicI64>,
    launched: bool,
}

impl<'a> Bullpen<'a> {
    /// Register a queue pair on the context and open the task connection.
    ///
    /// New bullpens cannot be created once workers have been launched,
    /// matching the server's registration model.
    pub async fn new(
        ctx: &'a DispatcherContext,
        hosts: Vec<String>,
        opts: LaunchOptions,
    ) -> Result<Bullpen<'a>, Error> {
        if ctx.launched() {
            return Err(Error::Bootstrap(
                "workers already launched, cannot create new bullpens".to_string(),
            ));
        }
        let queue_id = ctx.unique_random_string(QUEUE_ID_LEN).await;
        let task_client = QueueClient::connect(ctx.local_client_addr(), ctx.authkey()).await?;
        Ok(Bullpen {
            ctx,
            hosts,
            opts,
            task_queue: task_queue_name(&queue_id),
            result_queue: result_queue_name(&queue_id),
            queue_id,
            task_client,
            running: Arc::new(AtomicI64::new(0)),
            launched: false,
        })
    }

    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Workers currently believed alive, from STATUS bookkeeping.
    pub fn running_workers(&self) -> i64 {
        self.running.load(Ordering::SeqCst)
    }

    /// The shell fragment streamed to each remote host.
    fn bootstrap_script(&self, host: &str) -> String {
        let cwd = match &self.opts.remote_cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string()),
        };
        let mut script = format!("cd {cwd};\n");
        if let Some(activate) = &self.opts.activate {
            script.push_str(&format!("source {activate};\n"));
        }
        script.push_str(&format!("export {AUTHKEY_ENV}={}\n", self.ctx.authkey()));
        script.push_str(&format!(
            "nohup {} {} {} {} {} --label {} >/dev/null 2>&1 &\n",
            self.opts.worker_bin,
            self.opts.challenge_path,
            self.ctx.advertise_host,
            self.ctx.port(),
            self.queue_id,
            host,
        ));
        script.push_str("exit\n");
        script
    }

    fn ssh_target(&self, host: &str) -> String {
        match &self.opts.user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        }
    }

    /// Start one worker per host over ssh. A host that fails to launch is
    /// logged and skipped; the exit status of the remote shell is ignored.
    /// Returns the number of hosts a launch was attempted on successfully.
    pub async fn launch_workers(&mut self) -> Result<usize, Error> {
        if self.launched {
            return Err(Error::Launch("workers already launched".to_string()));
        }
        self.launched = true;
        self.ctx.mark_launched();

        let mut started = 0;
        for host in self.hosts.clone() {
            match self.launch_one(&host).await {
                Ok(()) => {
                    info!(%host, "worker launch dispatched");
                    started += 1;
                }
                Err(e) => warn!(%host, error = %e, "worker launch failed"),
            }
        }
        Ok(started)
    }

    async fn launch_one(&self, host: &str) -> Result<(), Error> {
        let mut command = Command::new("/usr/bin/ssh");
        command.arg("-oStrictHostKeyChecking=no");
        if let Some(identity) = &self.opts.identity_file {
            command.arg("-i").arg(identity);
        }
        command
            .arg(self.ssh_target(host))
            .arg("/bin/bash -s")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        let mut child = command
            .spawn()
            .map_err(|e| Error::Launch(format!("{host}: {e}")))?;
        let Some(mut stdin) = child.stdin.take() else {
            return Err(Error::Launch(format!("{host}: no stdin pipe")));
        };
        stdin
            .write_all(self.bootstrap_script(host).as_bytes())
            .await
            .map_err(|e| Error::Launch(format!("{host}: {e}")))?;
        stdin
            .shutdown()
            .await
            .map_err(|e| Error::Launch(format!("{host}: {e}")))?;
        // The remote shell backgrounds the worker and exits; its status
        // carries no signal.
        Ok(())
    }

    /// Enqueue one preterminal for the workers.
    pub async fn enqueue(&mut self, preterminal: &str) -> Result<(), Error> {
        self.task_client
            .put(
                &self.task_queue,
                &Task::Task {
                    preterminal: preterminal.to_string(),
                },
            )
            .await
    }

    /// Flood the task queue with one `TERM` per host. Workers terminate
    /// after finishing their current task.
    pub async fn kill_workers(&mut self) -> Result<(), Error> {
        for _ in 0..self.hosts.len() {
            self.task_client.put(&self.task_queue, &Task::Term).await?;
        }
        Ok(())
    }

    /// Open a result consumer on its own connection. Its STATUS
    /// bookkeeping feeds this bullpen's running-worker count.
    pub async fn result_feed(&self) -> Result<ResultFeed, Error> {
        let client = QueueClient::connect(self.ctx.local_client_addr(), self.ctx.authkey()).await?;
        Ok(ResultFeed {
            client,
            queue: self.result_queue.clone(),
            running: self.running.clone(),
        })
    }

    /// Wait for the running worker count to reach zero.
    ///
    /// The count only moves while a [`ResultFeed`] is draining the result
    /// queue, and a worker that crashed will never say goodbye; the
    /// timeout bounds both.
    pub async fn join(&self, timeout: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + timeout;
        loop {
            let running = self.running_workers();
            if running <= 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::JoinTimeout(timeout, running));
            }
            sleep(JOIN_POLL_INTERVAL).await;
        }
    }
}

/// Blocking consumer of the result queue.
///
/// STATUS messages are forwarded to the operator log and folded into the
/// running-worker count; `next_result` only returns on a RESULT.
pub struct ResultFeed {
    client: QueueClient,
    queue: String,
    running: Arc<AtomicI64>,
}

impl ResultFeed {
    /// Return the next RESULT, processing any STATUS messages encountered
    /// before it in arrival order.
    pub async fn next_result(&mut self) -> Result<TaskResult, Error> {
        loop {
            match self.client.get::<Report>(&self.queue).await? {
                Report::Status { text } => {
                    if text.contains("worker started") {
                        self.running.fetch_add(1, Ordering::SeqCst);
                    }
                    if text.contains("TERM") {
                        self.running.fetch_sub(1, Ordering::SeqCst);
                    }
                    info!("{text}");
                }
                Report::Result { result } => return Ok(result),
            }
        }
    }

    /// Workers currently believed alive.
    pub fn running_workers(&self) -> i64 {
        self.running.load(Ordering::SeqCst)
    }
}
