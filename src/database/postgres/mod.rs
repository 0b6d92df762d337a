//! PostgreSQL adapters.

mod airlines;
mod destinations;
mod flights;
mod users;

pub use airlines::PgAirlines;
pub use destinations::PgDestinations;
pub use flights::PgFlights;
pub use users::PgUsers;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::ServerError;

/// Open a connection pool.
pub async fn connect(
    hostname: &str,
    username: &str,
    password: &str,
    db: &str,
    pool: u32,
) -> Result<PgPool, sqlx::Error> {
    let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
    let pool = PgPoolOptions::new().max_connections(pool);
    let postgres = pool.connect(&addr).await?;

    tracing::info!(%hostname, %db, "postgres connected");

    Ok(postgres)
}

/// Turn a unique violation into `Conflict`, naming the clashing field from
/// the constraint.
pub(crate) fn conflict_on(
    kind: &str,
    fields: &[(&str, &str)],
) -> impl FnOnce(sqlx::Error) -> ServerError {
    move |err| {
        let Some(db_err) = err.as_database_error() else {
            return ServerError::Sql(err);
        };
        if !db_err.is_unique_violation() {
            return ServerError::Sql(err);
        }

        let field = db_err.constraint().and_then(|constraint| {
            fields
                .iter()
                .find(|(name, _)| *name == constraint)
                .map(|(_, field)| *field)
        });

        match field {
            Some(field) => ServerError::conflict(format!("{kind} {field}")),
            None => ServerError::conflict(kind),
        }
    }
}
