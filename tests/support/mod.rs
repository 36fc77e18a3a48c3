use actix::Actor;
use sqlx::PgPool;
use std::env;
use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard};

use barberflow::AppState;
use barberflow::api::evolution::EvolutionConfig;
use barberflow::ws::WsHub;

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

/// Recreates the test database and runs the migrations. Returns None when
/// TEST_DATABASE_URL is not set, so DB-backed tests skip instead of failing
/// on machines without Postgres.
pub async fn init_test_db() -> Option<TestDb> {
    dotenvy::dotenv().ok();
    let test_url = match env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping db-backed test");
            return None;
        }
    };
    let (admin_url, db_name) = split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url).await.expect("connect admin db");

    let _ = sqlx::query("SELECT pg_advisory_lock(424242)")
        .execute(&admin_pool)
        .await;

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    let create_result = sqlx::query(&create_sql).execute(&admin_pool).await;
    if let Err(e) = create_result {
        eprintln!("create test db error: {e}");
        let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
        sqlx::query(&create_sql)
            .execute(&admin_pool)
            .await
            .expect("create test db retry");
    }

    let _ = sqlx::query("SELECT pg_advisory_unlock(424242)")
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;

    let pool = PgPool::connect(&test_url).await.expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    Some(TestDb {
        pool,
        _guard: guard,
    })
}

#[allow(dead_code)]
pub fn build_state(pool: PgPool, webhook_secret: &str) -> AppState {
    AppState {
        pool,
        evolution: EvolutionConfig {
            base_url: "http://localhost".to_string(),
            api_key: "test-evolution".to_string(),
        },
        webhook_base_url: "http://localhost".to_string(),
        webhook_secret: webhook_secret.to_string(),
        ws_hub: WsHub::new().start(),
    }
}

#[allow(dead_code)]
pub async fn seed_barbershop(pool: &PgPool, slug: &str) -> i32 {
    use sqlx::Row;

    sqlx::query(
        r#"INSERT INTO barbershops (name, slug, phone)
           VALUES ($1, $2, '5511999990000')
           RETURNING id"#,
    )
    .bind(format!("Barbearia {slug}"))
    .bind(slug)
    .fetch_one(pool)
    .await
    .expect("insert barbershop")
    .get("id")
}

#[allow(dead_code)]
pub async fn seed_client(pool: &PgPool, barbershop_id: i32, name: &str) -> i32 {
    use sqlx::Row;

    sqlx::query(
        r#"INSERT INTO clients (barbershop_id, name, phone)
           VALUES ($1, $2, '5511988887777')
           RETURNING id"#,
    )
    .bind(barbershop_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .expect("insert client")
    .get("id")
}

#[allow(dead_code)]
pub async fn seed_provider(pool: &PgPool, barbershop_id: i32, name: &str) -> i32 {
    use sqlx::Row;

    sqlx::query(
        r#"INSERT INTO providers (barbershop_id, name)
           VALUES ($1, $2)
           RETURNING id"#,
    )
    .bind(barbershop_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .expect("insert provider")
    .get("id")
}

#[allow(dead_code)]
pub async fn seed_plan(
    pool: &PgPool,
    barbershop_id: i32,
    provider_id: i32,
    included_services: i32,
    enabled_service_ids: &[i32],
) -> i32 {
    use sqlx::Row;

    sqlx::query(
        r#"INSERT INTO subscription_plans
               (barbershop_id, provider_id, name, monthly_price, included_services_count,
                commission_percentage, enabled_service_ids)
           VALUES ($1, $2, 'Plano Mensal', 99.90, $3, 40.00, $4)
           RETURNING id"#,
    )
    .bind(barbershop_id)
    .bind(provider_id)
    .bind(included_services)
    .bind(enabled_service_ids.to_vec())
    .fetch_one(pool)
    .await
    .expect("insert plan")
    .get("id")
}
