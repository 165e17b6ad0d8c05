//! Stress drivers for submission and read-your-writes waits.
//!
//! Many threads submit random puts and deletes while waiting on their own
//! transactions, checking that every acknowledged id is unique and that the
//! watermark eventually covers all of them.

use bitempo_core::{
    DeleteOperation, Document, DocumentId, Node, PutOperation, Transaction, TransactionId,
    TransactionInstant,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
    /// Every transaction id the node acknowledged.
    pub acknowledged: BTreeSet<TransactionId>,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(
        successful: usize,
        failed: usize,
        duration: Duration,
        acknowledged: BTreeSet<TransactionId>,
    ) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
            acknowledged,
        }
    }

    /// Returns true if the acknowledged ids are exactly `1..=n`.
    pub fn ids_are_gap_free(&self) -> bool {
        self.acknowledged
            .iter()
            .zip(1_u64..)
            .all(|(id, expected)| id.as_u64() == expected)
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Transactions to submit per thread.
    pub operations: usize,
    /// Number of concurrent submitters.
    pub threads: usize,
    /// Number of distinct document ids.
    pub document_count: usize,
    /// Wait for every n-th transaction to be indexed; 0 never waits.
    pub await_every: usize,
    /// Share of operations that are deletes, in percent.
    pub delete_percent: u32,
    /// Timeout for each wait.
    pub await_timeout: Duration,
    /// Seed for the per-thread random generators.
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            document_count: 100,
            await_every: 10,
            delete_percent: 20,
            await_timeout: Duration::from_secs(10),
            seed: 0x5eed,
        }
    }
}

fn random_transaction(rng: &mut StdRng, config: &StressConfig, seq: usize) -> Transaction {
    let id = DocumentId::from(format!("doc-{}", rng.gen_range(0..config.document_count.max(1))));
    if rng.gen_range(0..100) < config.delete_percent {
        Transaction::single(DeleteOperation::create(id))
    } else {
        let doc = Document::create(id)
            .plus("seq", seq as i64)
            .and_then(|d| d.plus("payload", rng.gen::<i64>()))
            .expect("Stress documents use plain field names");
        Transaction::single(PutOperation::create(doc))
    }
}

fn submit_loop(
    node: &Node,
    config: &StressConfig,
    rng: &mut StdRng,
) -> (usize, usize, Vec<TransactionInstant>) {
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut instants = Vec::with_capacity(config.operations);

    for seq in 0..config.operations {
        let tx = random_transaction(rng, config, seq);
        match node.submit_tx(&tx) {
            Ok(instant) => {
                successful += 1;
                instants.push(instant);
                if config.await_every > 0
                    && (seq + 1) % config.await_every == 0
                    && node.await_tx(instant, config.await_timeout).is_err()
                {
                    failed += 1;
                }
            }
            Err(_) => failed += 1,
        }
    }

    (successful, failed, instants)
}

/// Submits from a single thread, waiting as configured.
pub fn stress_sequential_submits(node: &Node, config: &StressConfig) -> StressTestResult {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let start = Instant::now();
    let (successful, failed, instants) = submit_loop(node, config, &mut rng);
    StressTestResult::new(
        successful,
        failed,
        start.elapsed(),
        instants.into_iter().map(|i| i.tx_id).collect(),
    )
}

/// Submits from `config.threads` threads at once.
///
/// A thread's own instants must come back in increasing id order; any that
/// do not count as failures.
pub fn stress_concurrent_submits(node: &Arc<Node>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let node = Arc::clone(node);
            let config = config.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let (successful, mut failed, instants) = submit_loop(&node, &config, &mut rng);
                failed += instants
                    .windows(2)
                    .filter(|w| w[1].tx_id <= w[0].tx_id || w[1].tx_time < w[0].tx_time)
                    .count();
                (successful, failed, instants)
            })
        })
        .collect();

    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut acknowledged = BTreeSet::new();
    for handle in handles {
        match handle.join() {
            Ok((ok, err, instants)) => {
                successful += ok;
                failed += err;
                let before = acknowledged.len();
                acknowledged.extend(instants.iter().map(|i| i.tx_id));
                // a duplicate id is a failure too
                failed += instants.len() - (acknowledged.len() - before);
            }
            Err(_) => failed += config.operations,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed(), acknowledged)
}

/// Submits concurrently, then syncs and checks the watermark covers every
/// acknowledged id.
pub fn stress_submit_then_sync(node: &Arc<Node>, config: &StressConfig) -> StressTestResult {
    let mut result = stress_concurrent_submits(node, config);
    let highest = result.acknowledged.iter().next_back().copied();
    match node.sync(config.await_timeout) {
        Ok(synced) if synced.map(|i| i.tx_id) >= highest => {}
        _ => result.failed_ops += 1,
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestNode;

    fn small_config() -> StressConfig {
        StressConfig {
            operations: 100,
            threads: 4,
            document_count: 10,
            await_every: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_sequential_stress() {
        let node = TestNode::memory();
        let result = stress_sequential_submits(&node, &small_config());
        assert_eq!(result.successful_ops, 100);
        assert_eq!(result.failed_ops, 0);
        assert!(result.ids_are_gap_free());
    }

    #[test]
    fn test_concurrent_stress() {
        crate::init_test_logging();
        let test_node = TestNode::memory();
        let index = test_node.index.clone();
        let node = Arc::new(test_node.node);
        let config = small_config();

        let result = stress_submit_then_sync(&node, &config);
        result.print_summary("concurrent submit");
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, config.operations * config.threads);
        assert!(result.ids_are_gap_free());
        assert_eq!(
            index.indexed_through(),
            result.acknowledged.iter().next_back().copied()
        );
    }

    #[test]
    fn test_same_seed_same_transactions() {
        let config = small_config();
        let mut a = StdRng::seed_from_u64(config.seed);
        let mut b = StdRng::seed_from_u64(config.seed);
        for seq in 0..20 {
            assert_eq!(
                random_transaction(&mut a, &config, seq),
                random_transaction(&mut b, &config, seq)
            );
        }
    }
}
