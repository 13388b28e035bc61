use crate::config::ClientConfig;
use crate::core::types::{JobDescription, JobResult};
use crate::error::{ProtocolError, Result};
use crate::protocol::request::RequestFramer;
use crate::protocol::response::ResponseParser;
use crate::utils::metrics::{global_metrics, Timer};
use std::io::{Read, Write};
use tracing::{error, info, instrument};

/// Runs jobs over an already-connected transport.
///
/// One call owns the transport from the first header byte sent to the
/// last digest byte received. Once a call fails after bytes have moved,
/// the caller refuses further calls with `TransportUnusable`; open a new
/// connection instead.
///
/// # Example
/// ```no_run
/// use jobwire::{JobCaller, JobDescription};
/// use std::net::TcpStream;
///
/// # fn main() -> jobwire::error::Result<()> {
/// let stream = TcpStream::connect("127.0.0.1:7400")?;
/// let mut caller = JobCaller::new(stream);
///
/// let job = JobDescription::new("report.render")
///     .param("year", 2024i64)
///     .file("data/input.csv");
/// let result = caller.call_checked(&job)?;
/// for file in &result.files {
///     println!("got {}", file.name());
/// }
/// # Ok(())
/// # }
/// ```
pub struct JobCaller<T> {
    transport: T,
    config: ClientConfig,
    usable: bool,
}

impl<T: Read + Write> JobCaller<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            usable: true,
        }
    }

    /// Send one job and read its response.
    ///
    /// A non-zero return code is still `Ok`: the exchange itself succeeded.
    /// Use [`JobCaller::call_checked`] to turn it into `ProtocolError::Remote`.
    #[instrument(skip(self, job), fields(method = %job.method, params = job.params.len(), files = job.files.len()))]
    pub fn call(&mut self, job: &JobDescription) -> Result<JobResult> {
        if !self.usable {
            return Err(ProtocolError::TransportUnusable);
        }

        let metrics = global_metrics();
        metrics.call_started();
        let _timer = Timer::call();

        // Nothing has been written if preparation fails, so the transport stays usable.
        let framer = match RequestFramer::new(job, &self.config) {
            Ok(framer) => framer,
            Err(e) => {
                metrics.call_failed();
                error!(error = %e, "Failed to prepare request");
                return Err(e);
            }
        };

        let outcome = framer.write_to(&mut self.transport).and_then(|sent| {
            let result = ResponseParser::new(&mut self.transport, &self.config).parse()?;
            Ok((sent, result))
        });

        match outcome {
            Ok((sent, result)) => {
                if result.is_success() {
                    metrics.call_succeeded();
                } else {
                    metrics.call_remote_failed();
                }
                info!(
                    return_code = result.return_code,
                    bytes_sent = sent,
                    values = result.values.len(),
                    files = result.files.len(),
                    "Job call completed"
                );
                Ok(result)
            }
            Err(e) => {
                metrics.call_failed();
                if e.is_fatal() {
                    self.usable = false;
                }
                error!(error = %e, "Job call failed");
                Err(e)
            }
        }
    }

    /// Like [`JobCaller::call`], but a non-zero return code becomes
    /// `ProtocolError::Remote`.
    pub fn call_checked(&mut self, job: &JobDescription) -> Result<JobResult> {
        self.call(job)?.into_checked()
    }

    /// Whether the transport is still in a known state
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}
