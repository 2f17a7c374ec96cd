/// One-shot delayed events. There is no cancellation: callers that need to
/// stop a chain check their own flag when the event fires.
#[derive(Debug)]
pub struct TimerQueue<E> {
    now_seconds: f64,
    next_sequence: u64,
    pending: Vec<PendingTimer<E>>,
}

#[derive(Debug)]
struct PendingTimer<E> {
    due_seconds: f64,
    sequence: u64,
    event: E,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self {
            now_seconds: 0.0,
            next_sequence: 0,
            pending: Vec::new(),
        }
    }
}

impl<E> TimerQueue<E> {
    pub fn set_timeout_ms(&mut self, delay_ms: u64, event: E) {
        self.set_timeout_seconds(delay_ms as f64 / 1000.0, event);
    }

    pub fn set_timeout_seconds(&mut self, delay_seconds: f64, event: E) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        self.pending.push(PendingTimer {
            due_seconds: self.now_seconds + delay_seconds.max(0.0),
            sequence,
            event,
        });
    }

    /// Advances the clock and returns every event that came due, ordered by
    /// due time and then by scheduling order.
    pub fn advance(&mut self, dt_seconds: f32) -> Vec<E> {
        self.now_seconds += f64::from(dt_seconds.max(0.0));
        let now = self.now_seconds;
        let (mut due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|timer| timer.due_seconds <= now);
        self.pending = waiting;
        due.sort_by(|a, b| {
            a.due_seconds
                .total_cmp(&b.due_seconds)
                .then(a.sequence.cmp(&b.sequence))
        });
        due.into_iter().map(|timer| timer.event).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn now_seconds(&self) -> f64 {
        self.now_seconds
    }
}
