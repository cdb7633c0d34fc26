//! Capability interfaces consumed by agent nodes
//!
//! Agents never hold back-references to the orchestrator; they receive only
//! the capability handles their descriptor declares. The traits here are the
//! seams where real data repositories, file sandboxes, and SQL clients plug
//! in; the in-memory implementations are deterministic fixtures for tests
//! and demos.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Capability name for the financial data repository
pub const DATA_REPOSITORY: &str = "data_repository";
/// Capability name for the document sandbox
pub const DOCUMENT_STORE: &str = "document_store";
/// Capability name for the SQL executor
pub const DATABASE: &str = "database";

/// Errors from capability backends
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Repository unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Aggregated financial totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total: f64,
    pub income: f64,
    pub expenses: f64,
    pub transactions: u64,
}

/// Per-branch performance row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchMetrics {
    pub branch: String,
    pub total: f64,
    pub transactions: u64,
}

/// One flagged record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub id: String,
    pub branch: String,
    pub amount: f64,
    pub reason: String,
}

/// Read-only financial data source
#[async_trait]
pub trait DataRepository: Send + Sync {
    async fn financial_summary(&self) -> Result<FinancialSummary, CapabilityError>;
    async fn branch_breakdown(&self) -> Result<Vec<BranchMetrics>, CapabilityError>;
    async fn anomalies(&self) -> Result<Vec<AnomalyRecord>, CapabilityError>;
}

/// Sandboxed document writer
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn write(&self, name: &str, content: &str) -> Result<(), CapabilityError>;
    async fn read(&self, name: &str) -> Result<String, CapabilityError>;
}

/// Minimal SQL execution surface
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute a statement, returning the affected/returned row count
    async fn execute(&self, statement: &str) -> Result<u64, CapabilityError>;
}

/// Deterministic fixture repository
#[derive(Debug, Default)]
pub struct InMemoryDataRepository;

impl InMemoryDataRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataRepository for InMemoryDataRepository {
    async fn financial_summary(&self) -> Result<FinancialSummary, CapabilityError> {
        Ok(FinancialSummary {
            total: 125_000.50,
            income: 190_250.75,
            expenses: 65_250.25,
            transactions: 418,
        })
    }

    async fn branch_breakdown(&self) -> Result<Vec<BranchMetrics>, CapabilityError> {
        Ok(vec![
            BranchMetrics {
                branch: "north".to_string(),
                total: 52_000.25,
                transactions: 160,
            },
            BranchMetrics {
                branch: "central".to_string(),
                total: 48_500.0,
                transactions: 151,
            },
            BranchMetrics {
                branch: "south".to_string(),
                total: 24_500.25,
                transactions: 107,
            },
        ])
    }

    async fn anomalies(&self) -> Result<Vec<AnomalyRecord>, CapabilityError> {
        Ok(vec![
            AnomalyRecord {
                id: "txn-0182".to_string(),
                branch: "north".to_string(),
                amount: 9_800.0,
                reason: "amount 6x above branch median".to_string(),
            },
            AnomalyRecord {
                id: "txn-0304".to_string(),
                branch: "south".to_string(),
                amount: 4_150.0,
                reason: "duplicate reference number".to_string(),
            },
        ])
    }
}

/// In-memory document sandbox
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    files: Mutex<HashMap<String, String>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn write(&self, name: &str, content: &str) -> Result<(), CapabilityError> {
        self.files
            .lock()
            .insert(name.to_string(), content.to_string());
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<String, CapabilityError> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))
    }
}

/// Counting stub executor; accepts anything that parses as a single
/// statement and reports a fixed row count
#[derive(Debug, Default)]
pub struct InMemoryQueryExecutor {
    executed: Mutex<Vec<String>>,
}

impl InMemoryQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed_statements(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl QueryExecutor for InMemoryQueryExecutor {
    async fn execute(&self, statement: &str) -> Result<u64, CapabilityError> {
        if statement.trim().is_empty() {
            return Err(CapabilityError::Rejected("empty statement".to_string()));
        }
        self.executed.lock().push(statement.to_string());
        Ok(42)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_summary_is_deterministic() {
        let repo = InMemoryDataRepository::new();
        let first = repo.financial_summary().await.unwrap();
        let second = repo.financial_summary().await.unwrap();
        assert_eq!(first, second);
        assert!(first.total > 0.0);
    }

    #[tokio::test]
    async fn test_document_store_round_trip() {
        let store = InMemoryDocumentStore::new();
        store.write("report.md", "contents").await.unwrap();
        assert_eq!(store.read("report.md").await.unwrap(), "contents");
        assert!(matches!(
            store.read("missing.md").await,
            Err(CapabilityError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_query_executor_records_statements() {
        let executor = InMemoryQueryExecutor::new();
        let rows = executor.execute("SELECT * FROM txns").await.unwrap();
        assert_eq!(rows, 42);
        assert_eq!(executor.executed_statements().len(), 1);
        assert!(executor.execute("   ").await.is_err());
    }
}
