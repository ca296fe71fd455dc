//! Component E — the event sink: an append-only, ordered store of `TaxEvent`s and `AuditEntry`s.
//! Once appended, a record is never mutated; only push and ordered scan are supported.

use qntropy_core::{AuditEntry, TaxEvent};

#[derive(Debug, Default)]
pub struct EventSink {
    events: Vec<TaxEvent>,
    audit: Vec<AuditEntry>,
}

impl EventSink {
    pub fn new() -> Self {
        EventSink::default()
    }

    pub fn push_event(&mut self, event: TaxEvent) {
        self.events.push(event);
    }

    pub fn push_events(&mut self, events: impl IntoIterator<Item = TaxEvent>) {
        self.events.extend(events);
    }

    pub fn push_audit(&mut self, entry: AuditEntry) {
        self.audit.push(entry);
    }

    pub fn push_audits(&mut self, entries: impl IntoIterator<Item = AuditEntry>) {
        self.audit.extend(entries);
    }

    pub fn events(&self) -> &[TaxEvent] {
        &self.events
    }

    pub fn audit(&self) -> &[AuditEntry] {
        &self.audit
    }

    pub fn into_parts(self) -> (Vec<TaxEvent>, Vec<AuditEntry>) {
        (self.events, self.audit)
    }
}
