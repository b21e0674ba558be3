/// Receives one human-readable line before each step and once on completion.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// Latest message wins; receivers see the current step.
impl ProgressSink for tokio::sync::watch::Sender<String> {
    fn report(&self, message: &str) {
        self.send_replace(message.to_string());
    }
}

/// Discards progress.
pub struct Silent;

impl ProgressSink for Silent {
    fn report(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_closure_sink_collects() {
        let seen = Mutex::new(Vec::new());
        let sink = |m: &str| seen.lock().unwrap().push(m.to_string());
        sink.report("Step 1/6");
        sink.report("Step 2/6");
        assert_eq!(*seen.lock().unwrap(), vec!["Step 1/6", "Step 2/6"]);
    }

    #[test]
    fn test_watch_sink_keeps_latest() {
        let (tx, rx) = tokio::sync::watch::channel(String::new());
        tx.report("Step 1/6");
        tx.report("Analysis complete.");
        assert_eq!(*rx.borrow(), "Analysis complete.");
    }
}
