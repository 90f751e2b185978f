use crate::error::SignalError;
use crate::ports::SignalSource;
use ftrade_domain::entities::{Signal, Snapshot};
use std::fmt;
use std::sync::Arc;

/// Delegates the decision to an external signal source.
#[derive(Clone)]
pub struct AiDrivenStrategy {
    source: Arc<dyn SignalSource>,
}

impl AiDrivenStrategy {
    pub fn new(source: Arc<dyn SignalSource>) -> Self {
        Self { source }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub async fn propose(&self, snapshot: &Snapshot) -> Result<Signal, SignalError> {
        let signal = self.source.generate_signal(snapshot).await?;
        if signal.symbol != snapshot.symbol {
            return Err(SignalError::Unavailable(format!(
                "{} returned a signal for {} while asked about {}",
                self.source.name(),
                signal.symbol,
                snapshot.symbol
            )));
        }
        Ok(signal)
    }
}

impl fmt::Debug for AiDrivenStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiDrivenStrategy")
            .field("source", &self.source.name())
            .finish()
    }
}
