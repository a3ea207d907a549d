use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub student_rps: u32,
    pub manage_rps: u32,
    pub event_queue_capacity: usize,
    pub tab_switch_limit: i32,
    pub window_switch_limit: i32,
    pub face_visibility_limit: i32,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            student_rps: get_env_parse_or("STUDENT_RPS", 100)?,
            manage_rps: get_env_parse_or("MANAGE_RPS", 50)?,
            event_queue_capacity: get_env_parse_or("EVENT_QUEUE_CAPACITY", 1024)?,
            tab_switch_limit: get_env_parse_or("TAB_SWITCH_LIMIT", 3)?,
            window_switch_limit: get_env_parse_or("WINDOW_SWITCH_LIMIT", 3)?,
            face_visibility_limit: get_env_parse_or("FACE_VISIBILITY_LIMIT", 5)?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
