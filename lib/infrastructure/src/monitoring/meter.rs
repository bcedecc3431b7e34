use cached::proc_macro::cached;
use opentelemetry::KeyValue;

const METER_NAME: &str = "state_export";

pub fn increment(name: &'static str, kv: &[(&str, &str)]) {
    increment_by(name, 1, kv)
}

pub fn increment_by(name: &'static str, amount: u64, kv: &[(&str, &str)]) {
    let kv: Vec<KeyValue> = kv.iter().map(|(k, v)| as_kv(k, v)).collect();
    counter(name).add(amount, &kv)
}

fn as_kv(k: &str, v: &str) -> KeyValue {
    KeyValue::new(k.to_owned(), v.to_owned())
}

#[cached]
fn counter(name: &'static str) -> opentelemetry::metrics::Counter<u64> {
    opentelemetry::global::meter(METER_NAME).u64_counter(name).build()
}
