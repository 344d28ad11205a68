use log::{debug, error, info, trace};
use std::path::Path;
use std::process::exit;
use std::time::SystemTime;

use ordkv::util;
use ordkv::{Config, Database, Result};

fn benchmark(db: &Database, count: usize) -> Result<()> {
    let data = util::data(count, 42);

    let mut now = SystemTime::now();
    for (k, v) in data.iter() {
        debug!("insert: key='{}' val='{}'", hex::encode(k), hex::encode(v));
        db.put(k, v)?;
    }
    db.sync()?;
    let mut millis = now.elapsed().unwrap_or_default().as_millis();
    info!(
        "insert: {} ms (rate={} op/s)",
        millis,
        count as u128 * 1000 / millis.max(1)
    );

    now = SystemTime::now();
    let mut found = Vec::with_capacity(data.len());
    for (k, _) in data.iter() {
        if let Some(r) = db.get(k)? {
            found.push(r);
        } else {
            error!("key='{}' not found", hex::encode(k));
        }
    }
    millis = now.elapsed().unwrap_or_default().as_millis();
    info!(
        "lookup: {} ms (rate={} op/s)",
        millis,
        count as u128 * 1000 / millis.max(1)
    );

    let mut errors = 0;
    for ((k, v), r) in data.iter().zip(found.iter()) {
        if v != r {
            trace!(
                "ERROR: key='{}': expected '{}' but got '{}'",
                hex::encode(k),
                hex::encode(v),
                hex::encode(r)
            );
            errors += 1;
        }
    }
    if errors > 0 {
        error!("lookup errors: {}", errors);
    }

    now = SystemTime::now();
    let mut n = 0usize;
    let mut prev: Option<Vec<u8>> = None;
    let mut ok = db.cursor_first()?;
    while ok {
        let this = db.cursor_key()?.unwrap_or_default();
        if let Some(prev) = prev.as_ref() {
            if prev >= &this {
                error!(
                    "iter: asc order violated: {} comes before {} (n={})",
                    hex::encode(prev),
                    hex::encode(&this),
                    n
                );
                break;
            }
        }
        prev = Some(this);
        n += 1;
        ok = db.cursor_next()?;
    }
    millis = now.elapsed().unwrap_or_default().as_millis();
    info!(
        "iter:  asc {} ms (rate={} op/s) n={}",
        millis,
        n as u128 * 1000 / millis.max(1),
        n
    );

    now = SystemTime::now();
    for (key, _) in util::shuffle(data, 42).iter() {
        db.remove(key)?;
        if let Some(r) = db.get(key)? {
            error!("key='{}' not removed", hex::encode(&r));
        }
    }
    db.sync()?;
    millis = now.elapsed().unwrap_or_default().as_millis();
    info!(
        "remove: {} ms (rate={} op/s)",
        millis,
        count as u128 * 1000 / millis.max(1)
    );

    if db.size()? > 0 {
        error!("non-empty database: {} record(s) left", db.size()?);
    }
    Ok(())
}

fn arg(it: &mut impl Iterator<Item = String>, name: &str) -> Vec<u8> {
    let value = it.next().unwrap_or_default();
    match hex::decode(&value) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{}: expected hex string, got '{}' ({})", name, value, e);
            exit(2);
        }
    }
}

fn usage() -> ! {
    eprintln!("usage: ordkv <path> bench [count]");
    eprintln!("       ordkv <path> get <key>");
    eprintln!("       ordkv <path> put <key> <val>");
    eprintln!("       ordkv <path> rm <key>");
    eprintln!("       ordkv <path> dump");
    eprintln!("       ordkv <path> size");
    eprintln!("       ordkv <path> optimize");
    eprintln!("(keys and values are hex-encoded)");
    exit(2);
}

/// Returns the process exit code: 0 on success, 1 if the requested record was not found.
fn run(path: &Path, command: &str, mut it: impl Iterator<Item = String>) -> Result<i32> {
    let db = Database::open_with(path, Config::default())?;
    info!("file={:?} command={}", path, command);

    let mut code = 0;
    match command {
        "bench" => {
            let count = it
                .next()
                .and_then(|x| x.parse::<usize>().ok())
                .unwrap_or(1000);
            benchmark(&db, count)?;
        }
        "get" => {
            let key = arg(&mut it, "key");
            match db.get(&key)? {
                Some(val) => println!("{}", hex::encode(&val)),
                None => {
                    eprintln!("not found");
                    code = 1;
                }
            }
        }
        "put" => {
            let key = arg(&mut it, "key");
            let val = arg(&mut it, "val");
            db.put(&key, &val)?;
        }
        "rm" => {
            let key = arg(&mut it, "key");
            if !db.remove(&key)? {
                eprintln!("not found");
            }
        }
        "dump" => {
            let mut ok = db.cursor_first()?;
            while ok {
                let key = db.cursor_key()?.unwrap_or_default();
                let val = db.cursor_value()?.unwrap_or_default();
                println!("{} {}", hex::encode(&key), hex::encode(&val));
                ok = db.cursor_next()?;
            }
        }
        "size" => println!("{}", db.size()?),
        "optimize" => db.optimize()?,
        _ => usage(),
    }

    db.close()?;
    Ok(code)
}

fn main() {
    env_logger::init();
    let mut it = std::env::args().skip(1);
    let path = it.next().unwrap_or_else(|| usage());
    let command = it.next().unwrap_or_else(|| usage());

    match run(Path::new(&path), &command, it) {
        Ok(code) => exit(code),
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn args(xs: &[&str]) -> impl Iterator<Item = String> {
        xs.iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_exit_codes() {
        let path = PathBuf::from("target/cli_codes.tmp");
        fs::create_dir_all("target").unwrap();
        fs::remove_file(&path).ok();
        fs::remove_file("target/cli_codes.tmp.wal").ok();

        assert_eq!(run(&path, "put", args(&["6b6579", "76616c"])).unwrap(), 0);
        assert_eq!(run(&path, "get", args(&["6b6579"])).unwrap(), 0);
        assert_eq!(run(&path, "get", args(&["6d697373"])).unwrap(), 1);
        assert_eq!(run(&path, "rm", args(&["6d697373"])).unwrap(), 0);

        let db = Database::open(&path).unwrap();
        assert_eq!(db.size().unwrap(), 1);
        assert_eq!(db.get(b"key").unwrap(), Some(b"val".to_vec()));
        db.close().unwrap();
    }
}
