// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use super::super::{AgentError, ManagerError, StoreError};

    #[test]
    fn test_busy_error_message() {
        let err = AgentError::Busy {
            agent: "agent-a".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Zone inventory is temporarily busy on the agent agent-a"
        );
    }

    #[test]
    fn test_not_inited_error_message() {
        let err = AgentError::NotInited {
            agent: "agent-b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Zone inventory has not been initialized on the agent agent-b"
        );
    }

    #[test]
    fn test_other_error_is_verbatim() {
        let err = AgentError::Other("connection refused".to_string());
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn test_cancelled_and_timeout() {
        assert_eq!(AgentError::cancelled().to_string(), "cancelled");
        assert!(AgentError::cancelled().is_cancelled());
        assert_eq!(AgentError::timeout().to_string(), "timeout");
        assert!(!AgentError::timeout().is_cancelled());
    }

    #[test]
    fn test_store_error_retryable() {
        assert!(StoreError::Conflict("deadlock".to_string()).is_retryable());
        assert!(!StoreError::Database("disk full".to_string()).is_retryable());
        assert!(!StoreError::DaemonNotFound(3).is_retryable());
    }

    #[test]
    fn test_manager_error_messages() {
        assert_eq!(
            ManagerError::AlreadyFetching.to_string(),
            "Zone fetch is already in progress"
        );
        let err = ManagerError::InvalidParameter {
            name: "parallelism",
            reason: "must be greater than zero".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid fetch parameter 'parallelism': must be greater than zero"
        );
        let err: ManagerError = StoreError::Database("gone".to_string()).into();
        assert!(err.to_string().contains("gone"));
    }
}
