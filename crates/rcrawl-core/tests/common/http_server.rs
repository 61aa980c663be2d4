//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves `/ok` with a fixed 200 body and `/fail` with a 500; anything else
//! gets a 404. One connection per thread, `Connection: close` semantics.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

/// Starts the server in a background thread and returns the base URL,
/// e.g. "http://127.0.0.1:12345/". Runs until the process exits.
pub fn start() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || handle(stream));
        }
    });
    format!("http://127.0.0.1:{}/", port)
}

fn handle(mut stream: TcpStream) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let path = request
        .split_whitespace()
        .nth(1)
        .unwrap_or("/");

    let (status, body): (&str, &[u8]) = match path {
        "/ok" => ("200 OK", b"hello"),
        "/fail" => ("500 Internal Server Error", b"boom"),
        _ => ("404 Not Found", b""),
    };
    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(body);
}
