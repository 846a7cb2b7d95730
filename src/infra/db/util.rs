use crate::application::ExecError;

pub fn map_sqlx_error(err: sqlx::Error) -> ExecError {
    match err {
        sqlx::Error::PoolTimedOut => ExecError::connection("timed out acquiring a pooled connection"),
        sqlx::Error::PoolClosed => ExecError::connection("connection pool is closed"),
        sqlx::Error::Io(io) => ExecError::connection(io),
        sqlx::Error::Tls(tls) => ExecError::connection(tls),
        sqlx::Error::Database(db) => ExecError::query(db.message()),
        sqlx::Error::ColumnDecode { index, source } => {
            ExecError::decode(format!("column {index}: {source}"))
        }
        sqlx::Error::Decode(source) => ExecError::decode(source),
        other => ExecError::query(other),
    }
}
