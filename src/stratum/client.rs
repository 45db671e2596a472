use {
    super::*,
    super::error::{ConnectSnafu, ConnectTimeoutSnafu, IoSnafu, SerializationSnafu, UnauthorizedSnafu},
    crate::backoff::Backoff,
};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: String,
    pub username: String,
    pub password: Option<String>,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl ClientConfig {
    pub fn new(address: String, username: String, password: Option<String>) -> Self {
        Self {
            address,
            username,
            password,
            user_agent: USER_AGENT.into(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// The pool-facing half of the miner: dials the pool, walks the
/// subscribe/authorize handshake, publishes jobs to the dispatcher, drains
/// the share queue into `mining.submit`, and reconnects under backoff when
/// the session drops. Returns only on shutdown or on an authorization
/// refusal, which is fatal.
pub struct Client {
    config: ClientConfig,
    dispatcher: Arc<Dispatcher>,
    shares: Arc<ShareQueue>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
}

enum Pending {
    Subscribe,
    Authorize,
    Submit { job_id: JobId },
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

#[derive(Default)]
struct Session {
    extranonce1: Extranonce,
    extranonce2_size: usize,
    difficulty: Difficulty,
    authorized: bool,
    next_id: u64,
    pending: BTreeMap<u64, Pending>,
}

impl Session {
    fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    fn subscribed(&self) -> bool {
        self.extranonce2_size != 0
    }
}

impl Client {
    pub fn new(
        config: ClientConfig,
        dispatcher: Arc<Dispatcher>,
        shares: Arc<ShareQueue>,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            dispatcher,
            shares,
            metrics,
            cancel,
        }
    }

    pub async fn run(self) -> Result<(), ClientError> {
        let mut backoff = Backoff::new();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            match self.connect().await {
                Ok(stream) => {
                    info!("connected to pool {}", self.config.address);

                    match self.session(stream, &mut backoff).await {
                        Ok(SessionEnd::Shutdown) => return Ok(()),
                        Ok(SessionEnd::Disconnected) => {}
                        Err(err @ ClientError::Unauthorized { .. }) => return Err(err),
                        Err(err) => warn!("pool session failed: {err}"),
                    }
                }
                Err(err) => warn!("{err}"),
            }

            // The next session renegotiates extranonce1; anything mined
            // against the old one must not be submitted.
            self.dispatcher.clear();

            let delay = backoff.next_delay();
            debug!("reconnecting in {:.1}s", delay.as_secs_f64());

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }
        }
    }

    async fn connect(&self) -> Result<TcpStream, ClientError> {
        let stream = snafu::ResultExt::context(
            timeout(
                self.config.connect_timeout,
                TcpStream::connect(&self.config.address),
            )
            .await
            .map_err(|_| {
                ConnectTimeoutSnafu {
                    address: self.config.address.clone(),
                }
                .build()
            })?,
            ConnectSnafu {
                address: self.config.address.clone(),
            },
        )?;

        stream.set_nodelay(true).ok();

        Ok(stream)
    }

    async fn session(
        &self,
        stream: TcpStream,
        backoff: &mut Backoff,
    ) -> Result<SessionEnd, ClientError> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut session = Session::new();

        let subscribe = Subscribe {
            user_agent: self.config.user_agent.clone(),
            extranonce1: None,
        };

        self.send_request(
            &mut writer,
            &mut session,
            "mining.subscribe",
            snafu::ResultExt::context(serde_json::to_value(&subscribe), SerializationSnafu)?,
            Pending::Subscribe,
        )
        .await?;

        // Accumulated outside the select: a read_until future dropped by a
        // winning branch leaves its partial line here, and the next read
        // appends to it instead of losing bytes.
        let mut buffer = Vec::new();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(SessionEnd::Shutdown),

                read = timeout(self.config.read_timeout, reader.read_until(b'\n', &mut buffer)) => {
                    match read {
                        Err(_) => {
                            warn!("pool idle for {:?}, reconnecting", self.config.read_timeout);
                            return Ok(SessionEnd::Disconnected);
                        }
                        Ok(Err(err)) => return Err(ClientError::Io { source: err }),
                        Ok(Ok(0)) => {
                            info!("pool closed the connection");
                            return Ok(SessionEnd::Disconnected);
                        }
                        Ok(Ok(_)) => {}
                    }

                    if buffer.len() > MAX_MESSAGE_SIZE {
                        return Err(ClientError::Protocol {
                            message: format!("oversize message ({} bytes)", buffer.len()),
                        });
                    }

                    if !buffer.ends_with(b"\n") {
                        continue;
                    }

                    let line = std::str::from_utf8(&buffer)
                        .map_err(|_| ClientError::Protocol {
                            message: "message is not utf-8".into(),
                        })?
                        .trim_end()
                        .to_string();

                    self.handle_line(&line, &mut session, &mut writer, backoff).await?;
                    buffer.clear();
                }

                candidate = self.shares.recv(), if session.authorized => {
                    self.submit(candidate, &mut session, &mut writer).await?;
                }
            }
        }
    }

    async fn handle_line<W: AsyncWrite + Unpin>(
        &self,
        line: &str,
        session: &mut Session,
        writer: &mut W,
        backoff: &mut Backoff,
    ) -> Result<(), ClientError> {
        let message: Message = serde_json::from_str(line).map_err(|err| ClientError::Protocol {
            message: format!("malformed message {line:?}: {err}"),
        })?;

        match message {
            Message::Response {
                id,
                result,
                error,
                reject_reason,
            } => {
                let Id::Number(id) = id else {
                    warn!("response with non-numeric id: {line:?}");
                    return Ok(());
                };

                match session.pending.remove(&id) {
                    None => warn!("unmatched response id {id}"),
                    Some(Pending::Subscribe) => {
                        self.handle_subscribed(result, error, session, writer).await?;
                    }
                    Some(Pending::Authorize) => {
                        self.handle_authorized(result, error, session, backoff)?;
                    }
                    Some(Pending::Submit { job_id }) => {
                        self.handle_submitted(result, error, reject_reason, &job_id);
                    }
                }
            }
            Message::Notification { method, params } => match method.as_str() {
                "mining.set_difficulty" => match serde_json::from_value::<SetDifficulty>(params) {
                    Ok(set_difficulty) => {
                        let difficulty = set_difficulty.difficulty();
                        session.difficulty = difficulty;
                        self.metrics.set_difficulty(difficulty);
                        info!("pool difficulty set to {difficulty}");
                    }
                    Err(err) => warn!("unparseable mining.set_difficulty: {err}"),
                },
                "mining.notify" => self.handle_notify(params, session),
                other => debug!("unhandled notification `{other}`"),
            },
            Message::Request { method, .. } => {
                debug!("ignoring server request `{method}`");
            }
        }

        Ok(())
    }

    async fn handle_subscribed<W: AsyncWrite + Unpin>(
        &self,
        result: Option<Value>,
        error: Option<JsonRpcError>,
        session: &mut Session,
        writer: &mut W,
    ) -> Result<(), ClientError> {
        if let Some(error) = error {
            return Err(ClientError::Protocol {
                message: format!("mining.subscribe failed: {error}"),
            });
        }

        let result = result.ok_or_else(|| ClientError::Protocol {
            message: "mining.subscribe returned no result".into(),
        })?;

        let subscribed: SubscribeResult =
            snafu::ResultExt::context(serde_json::from_value(result), SerializationSnafu)?;

        if !(1..=8).contains(&subscribed.extranonce2_size) {
            return Err(ClientError::Protocol {
                message: format!(
                    "unusable extranonce2 size {}",
                    subscribed.extranonce2_size
                ),
            });
        }

        info!(
            "subscribed: extranonce1={}, extranonce2_size={}",
            subscribed.extranonce1, subscribed.extranonce2_size
        );

        session.extranonce1 = subscribed.extranonce1;
        session.extranonce2_size = subscribed.extranonce2_size;

        let authorize = Authorize {
            username: self.config.username.clone(),
            password: Some(self.config.password.clone().unwrap_or_else(|| "x".into())),
        };

        self.send_request(
            writer,
            session,
            "mining.authorize",
            snafu::ResultExt::context(serde_json::to_value(&authorize), SerializationSnafu)?,
            Pending::Authorize,
        )
        .await
    }

    fn handle_authorized(
        &self,
        result: Option<Value>,
        error: Option<JsonRpcError>,
        session: &mut Session,
        backoff: &mut Backoff,
    ) -> Result<(), ClientError> {
        let authorized =
            error.is_none() && result.as_ref().and_then(Value::as_bool) == Some(true);

        if !authorized {
            if let Some(error) = error {
                warn!("authorize error: {error}");
            }

            return UnauthorizedSnafu {
                username: self.config.username.clone(),
            }
            .fail();
        }

        session.authorized = true;
        backoff.reset();

        info!("session up: worker {} authorized", self.config.username);

        Ok(())
    }

    fn handle_submitted(
        &self,
        result: Option<Value>,
        error: Option<JsonRpcError>,
        reject_reason: Option<String>,
        job_id: &JobId,
    ) {
        let accepted =
            error.is_none() && result.as_ref().and_then(Value::as_bool) == Some(true);

        if accepted {
            self.metrics.record_share_accepted();
            info!("share accepted for job {job_id}");
            return;
        }

        let reason = reject_reason
            .or_else(|| error.as_ref().map(|error| error.message.clone()))
            .unwrap_or_else(|| "unknown".into());

        // ckpool and friends say "stale" outright; code 21 is the classic
        // job-not-found rejection for work the pool has moved past.
        let stale = error.as_ref().map(|error| error.error_code) == Some(21)
            || reason.to_lowercase().contains("stale")
            || reason.to_lowercase().contains("job not found");

        if stale {
            self.metrics.record_share_rejected_stale();
        } else {
            self.metrics.record_share_rejected_other();
        }

        warn!("share rejected for job {job_id}: {reason}");
    }

    fn handle_notify(&self, params: Value, session: &Session) {
        if !session.subscribed() {
            warn!("mining.notify before subscribe result, ignoring");
            return;
        }

        let notify: Notify = match serde_json::from_value(params) {
            Ok(notify) => notify,
            Err(err) => {
                warn!("unparseable mining.notify: {err}");
                return;
            }
        };

        let job_id = notify.job_id.clone();
        let clean_jobs = notify.clean_jobs;

        match Job::assemble(
            notify,
            &session.extranonce1,
            session.extranonce2_size,
            session.difficulty,
        ) {
            Ok(job) => {
                info!("new job {job_id} (clean_jobs={clean_jobs})");
                self.dispatcher.publish(job);
            }
            Err(err) => warn!("ignoring malformed job {job_id}: {err:#}"),
        }
    }

    async fn submit<W: AsyncWrite + Unpin>(
        &self,
        candidate: ShareCandidate,
        session: &mut Session,
        writer: &mut W,
    ) -> Result<(), ClientError> {
        // Submitted even when the job has been superseded: some pools take
        // stale shares, and a rejection is recorded as stale, not an error.
        let submit = Submit {
            username: self.config.username.clone(),
            job_id: candidate.job_id.clone(),
            extranonce2: candidate.extranonce2,
            ntime: candidate.ntime,
            nonce: candidate.nonce,
        };

        self.send_request(
            writer,
            session,
            "mining.submit",
            snafu::ResultExt::context(serde_json::to_value(&submit), SerializationSnafu)?,
            Pending::Submit {
                job_id: candidate.job_id,
            },
        )
        .await
    }

    async fn send_request<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        session: &mut Session,
        method: &str,
        params: Value,
        pending: Pending,
    ) -> Result<(), ClientError> {
        let id = session.next_id;
        session.next_id += 1;

        let frame = snafu::ResultExt::context(
            serde_json::to_string(&Message::request(id, method, params)),
            SerializationSnafu,
        )? + "\n";

        snafu::ResultExt::context(writer.write_all(frame.as_bytes()).await, IoSnafu)?;
        snafu::ResultExt::context(writer.flush().await, IoSnafu)?;

        session.pending.insert(id, pending);

        Ok(())
    }
}

