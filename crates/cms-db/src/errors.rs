// [crates/cms-db/src/errors.rs]
/*!
 * =================================================================
 * APARATO: DATABASE ERROR CATALOG
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("[L3_DB_NET_FAULT]: connection to persistence layer failed -> {0}")]
    ConnectionError(String),

    #[error("[L3_DB_CONFIG_FAULT]: database configuration invalid -> {0}")]
    ConfigurationError(String),

    #[error("[L3_DB_QUERY_FAULT]: query rejected by storage engine -> {0}")]
    QueryError(#[from] libsql::Error),

    #[error("[L3_DB_MAPPING_FAULT]: row-to-domain mapping failed -> {0}")]
    MappingError(String),

    #[error("[L3_DB_FAULT]: requested record not found")]
    NotFound,

    #[error("[L3_DB_CONFLICT]: uniqueness constraint violated -> {0}")]
    Conflict(String),
}
