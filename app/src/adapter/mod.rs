pub mod homeassistant;
pub mod influxdb;
