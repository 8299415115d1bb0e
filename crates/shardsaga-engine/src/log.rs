//! Append-only execution log
//!
//! Every forward unit that commits locally appends one record, in completion
//! order. The log is only appended to while the saga executes and only read
//! (newest first) while it compensates.

use shardsaga_core::ExecutionRecord;

#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    records: Vec<ExecutionRecord>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next appended record must carry
    pub fn next_sequence(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn append(&mut self, record: ExecutionRecord) {
        debug_assert_eq!(record.sequence, self.next_sequence());
        self.records.push(record);
    }

    /// Records in completion order
    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// Records in compensation order: last completed first
    pub fn compensation_order(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardsaga_core_types::SagaId;

    fn record(saga_id: &SagaId, sequence: u64) -> ExecutionRecord {
        ExecutionRecord {
            saga_id: saga_id.clone(),
            sequence,
            statement_index: 0,
            unit_index: sequence as usize,
            data_source: format!("ds_{}", sequence),
            actual_table: "t_order_0".into(),
            affected_rows: 1,
            revert: None,
        }
    }

    #[test]
    fn test_compensation_order_is_reverse_completion_order() {
        let id = SagaId::new();
        let mut log = ExecutionLog::new();
        for _ in 0..3 {
            let sequence = log.next_sequence();
            log.append(record(&id, sequence));
        }
        let order: Vec<u64> = log.compensation_order().map(|r| r.sequence).collect();
        assert_eq!(order, vec![2, 1, 0]);
        assert_eq!(log.len(), 3);
    }
}
