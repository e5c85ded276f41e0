//! Minimal tour of the engine API: open, put, get, delete, stats.
//!
//! ```text
//! cargo run -p engine --example basic
//! ```

use engine::{Config, Engine};

fn main() -> engine::Result<()> {
    let mut config = Config::default();
    config.dir_path = std::env::temp_dir().join("lodekv-basic");

    let db = Engine::open(config)?;

    db.put(b"name", b"lodekv")?;
    let value = db.get(b"name")?;
    println!("name = {}", String::from_utf8_lossy(&value));

    db.put(b"name", b"lodekv-v2")?;
    let value = db.get(b"name")?;
    println!("name = {}", String::from_utf8_lossy(&value));

    db.delete(b"name")?;
    match db.get(b"name") {
        Err(engine::Error::KeyNotFound) => println!("name deleted"),
        other => println!("unexpected: {:?}", other.map(|v| v.len())),
    }

    for n in 0..100u32 {
        db.put(format!("user:{n:03}").as_bytes(), b"profile")?;
    }
    let stat = db.stat()?;
    println!(
        "{} keys across {} data file(s), {} reclaimable byte(s)",
        stat.key_num, stat.data_file_num, stat.reclaimable_size
    );

    db.close()
}
