//! Blocking TCP client
//!
//! One request, one response, over a single persistent connection.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use serde_json::Value;

use crate::error::{LogKvError, Result};
use crate::protocol::{read_response, write_command, Command, QueryRequest, Response, Status};
use crate::record::Record;

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Connect to a server
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| LogKvError::Network(format!("failed to connect: {}", e)))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }

    /// Send a command and wait for its response
    pub fn send(&mut self, command: &Command) -> Result<Response> {
        write_command(&mut self.writer, command)?;
        read_response(&mut self.reader)
    }

    /// Send a raw query
    pub fn query(&mut self, request: QueryRequest) -> Result<()> {
        let response = self.send(&Command::Query(request))?;
        expect_ok(response).map(|_| ())
    }

    /// Add a record for `key`
    pub fn add(&mut self, key: &str, value: Value) -> Result<()> {
        self.query(QueryRequest::add(key, value))
    }

    /// Latest record for `key`, if any
    pub fn find(&mut self, key: &str) -> Result<Option<Record>> {
        let response = self.send(&Command::Find {
            key: key.to_string(),
        })?;
        match response.status {
            Status::NotFound => Ok(None),
            _ => expect_ok(response)?.into_record().map(Some),
        }
    }

    /// Ask the server to drain and stop
    pub fn stop(&mut self) -> Result<()> {
        let response = self.send(&Command::Stop)?;
        expect_ok(response).map(|_| ())
    }

    /// Health check
    pub fn ping(&mut self) -> Result<()> {
        let response = expect_ok(self.send(&Command::Ping)?)?;
        match response.text().as_str() {
            "PONG" => Ok(()),
            other => Err(LogKvError::Protocol(format!("unexpected ping reply: {}", other))),
        }
    }
}

fn expect_ok(response: Response) -> Result<Response> {
    match response.status {
        Status::Ok => Ok(response),
        Status::NotFound => Err(LogKvError::Protocol("unexpected NOT_FOUND".to_string())),
        Status::Error => Err(LogKvError::Network(format!(
            "server error: {}",
            response.text()
        ))),
    }
}
