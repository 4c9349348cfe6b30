//! Fake RESP2 servers for integration tests.
//!
//! Each server accepts one connection on a std thread and answers a fixed
//! number of commands through the supplied handler.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use kvlink_client::BackendSettings;

pub fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    (listener, addr)
}

/// Address nothing listens on.
pub fn dead_address() -> String {
    let (listener, addr) = bind();
    drop(listener);
    addr
}

pub fn port_of(addr: &str) -> u16 {
    addr.rsplit_once(':').expect("port").1.parse().expect("numeric port")
}

pub fn serve<F>(listener: TcpListener, expected_commands: usize, mut handler: F)
where
    F: FnMut(usize, Vec<Vec<u8>>, &mut TcpStream) + Send + 'static,
{
    serve_connections(listener, vec![expected_commands], move |_, idx, args, stream| {
        handler(idx, args, stream)
    });
}

/// Accepts one connection per entry of `commands_per_connection`, in order.
/// Each connection is dropped once its commands are answered.
pub fn serve_connections<F>(listener: TcpListener, commands_per_connection: Vec<usize>, mut handler: F)
where
    F: FnMut(usize, usize, Vec<Vec<u8>>, &mut TcpStream) + Send + 'static,
{
    thread::spawn(move || {
        for (conn_idx, expected_commands) in commands_per_connection.into_iter().enumerate() {
            let (mut stream, _) = listener.accept().expect("accept");
            let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            for idx in 0..expected_commands {
                let args = read_command(&mut reader).expect("read command");
                handler(conn_idx, idx, args, &mut stream);
            }
        }
    });
}

pub fn spawn_server<F>(expected_commands: usize, handler: F) -> String
where
    F: FnMut(usize, Vec<Vec<u8>>, &mut TcpStream) + Send + 'static,
{
    let (listener, addr) = bind();
    serve(listener, expected_commands, handler);
    addr
}

pub fn settings(host: impl Into<String>) -> BackendSettings {
    BackendSettings::new(host).with_timeout(2_000)
}

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<Vec<u8>>> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?.ok_or_else(eof)?;
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_usize(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?.ok_or_else(eof)?;
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != [b'\r', b'\n'] {
            return Err(invalid("missing crlf"));
        }
        args.push(data);
    }
    Ok(args)
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<Option<()>> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Ok(None);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(Some(()))
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    if data.is_empty() || !data.iter().all(u8::is_ascii_digit) {
        return Err(invalid("digit"));
    }
    Ok(data
        .iter()
        .fold(0usize, |acc, &b| acc.saturating_mul(10).saturating_add((b - b'0') as usize)))
}

fn eof() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof")
}

fn invalid(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}

pub fn write_raw(stream: &mut TcpStream, data: &[u8]) {
    let _ = stream.write_all(data);
    let _ = stream.flush();
}

pub fn write_simple(stream: &mut TcpStream, msg: &str) {
    write_raw(stream, format!("+{}\r\n", msg).as_bytes());
}

pub fn write_error(stream: &mut TcpStream, msg: &str) {
    write_raw(stream, format!("-{}\r\n", msg).as_bytes());
}

pub fn write_bulk(stream: &mut TcpStream, data: &[u8]) {
    let mut frame = format!("${}\r\n", data.len()).into_bytes();
    frame.extend_from_slice(data);
    frame.extend_from_slice(b"\r\n");
    write_raw(stream, &frame);
}

pub fn write_null(stream: &mut TcpStream) {
    write_raw(stream, b"$-1\r\n");
}

pub fn write_integer(stream: &mut TcpStream, value: i64) {
    write_raw(stream, format!(":{}\r\n", value).as_bytes());
}

/// `CLUSTER SLOTS` reply assigning every slot to one primary.
pub fn write_single_owner_slots(stream: &mut TcpStream, host: &str, port: u16) {
    let frame = format!(
        "*1\r\n*3\r\n:0\r\n:16383\r\n*3\r\n${}\r\n{}\r\n:{}\r\n$7\r\nnode-id\r\n",
        host.len(),
        host,
        port
    );
    write_raw(stream, frame.as_bytes());
}

pub fn args_eq(args: &[Vec<u8>], expected: &[&str]) -> bool {
    args.len() == expected.len() && args.iter().zip(expected).all(|(a, e)| a == e.as_bytes())
}
