use std::{
    collections::HashMap,
    io::{BufRead, BufReader, Read, Write},
    net::TcpStream,
};

use super::{HttpRequest, HttpResponse, MAX_HTTP_BODY_BYTES};

pub(super) fn read_http_request(stream: &mut TcpStream) -> Result<Option<HttpRequest>, String> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    let bytes = reader
        .read_line(&mut request_line)
        .map_err(|e| e.to_string())?;
    if bytes == 0 {
        return Ok(None);
    }

    let (method, target) = parse_request_line(&request_line)?;

    let mut headers = HashMap::new();
    loop {
        let mut header_line = String::new();
        let bytes = reader
            .read_line(&mut header_line)
            .map_err(|e| e.to_string())?;
        if bytes == 0 || header_line == "\r\n" {
            break;
        }

        let (name, value) = header_line
            .split_once(':')
            .ok_or_else(|| "invalid HTTP header".to_string())?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let content_length = parse_content_length(&headers)?;
    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).map_err(|e| e.to_string())?;
    }

    Ok(Some(HttpRequest {
        method,
        target,
        headers,
        body,
    }))
}

pub(super) fn parse_http_request_bytes(raw_request: &[u8]) -> Result<HttpRequest, String> {
    let request_text =
        std::str::from_utf8(raw_request).map_err(|_| "request must be valid UTF-8".to_string())?;
    let (header_block, body) = request_text
        .split_once("\r\n\r\n")
        .ok_or_else(|| "missing HTTP header terminator".to_string())?;

    let mut lines = header_block.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| "missing request line".to_string())?;
    let (method, target) = parse_request_line(request_line)?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| "invalid HTTP header".to_string())?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let content_length = parse_content_length(&headers)?;
    if content_length != body.len() {
        return Err("content-length does not match body size".to_string());
    }

    Ok(HttpRequest {
        method,
        target,
        headers,
        body: body.as_bytes().to_vec(),
    })
}

fn parse_content_length(headers: &HashMap<String, String>) -> Result<usize, String> {
    let content_length = match headers.get("content-length") {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| "invalid content-length header".to_string())?,
        None => 0,
    };
    if content_length > MAX_HTTP_BODY_BYTES {
        return Err(format!(
            "content-length exceeds max body size ({MAX_HTTP_BODY_BYTES} bytes)"
        ));
    }
    Ok(content_length)
}

pub(super) fn parse_request_line(line: &str) -> Result<(String, String), String> {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| "missing HTTP method".to_string())?;
    let target = parts
        .next()
        .ok_or_else(|| "missing HTTP target".to_string())?;
    let version = parts
        .next()
        .ok_or_else(|| "missing HTTP version".to_string())?;
    if !version.starts_with("HTTP/1.") {
        return Err("unsupported HTTP version".to_string());
    }
    Ok((method.to_string(), target.to_string()))
}

pub(super) fn request_path(target: &str) -> &str {
    target
        .split_once('?')
        .map(|(path, _)| path)
        .unwrap_or(target)
}

pub(super) fn write_response(
    stream: &mut TcpStream,
    response: HttpResponse,
) -> std::io::Result<()> {
    stream.write_all(&render_response_bytes(&response))?;
    stream.flush()
}

pub(super) fn render_response_bytes(response: &HttpResponse) -> Vec<u8> {
    let status_text = match response.status {
        200 => "200 OK",
        400 => "400 Bad Request",
        404 => "404 Not Found",
        405 => "405 Method Not Allowed",
        503 => "503 Service Unavailable",
        _ => "500 Internal Server Error",
    };
    let mut head = format!("HTTP/1.1 {status_text}\r\n");
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        response.body.len()
    ));

    let mut out = head.into_bytes();
    out.extend_from_slice(&response.body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request_line_rejects_non_http1_versions() {
        assert_eq!(
            parse_request_line("GET /health HTTP/1.1\r\n"),
            Ok(("GET".to_string(), "/health".to_string()))
        );
        assert!(parse_request_line("GET /health HTTP/2").is_err());
        assert!(parse_request_line("GET").is_err());
    }

    #[test]
    fn request_path_strips_query_string() {
        assert_eq!(request_path("/v1/hero-stats?cache=no"), "/v1/hero-stats");
        assert_eq!(request_path("/health"), "/health");
    }

    #[test]
    fn parse_http_request_bytes_checks_body_length() {
        let request = parse_http_request_bytes(
            b"POST /v1/hero-stats HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}",
        )
        .unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.body, b"{}".to_vec());

        let err = parse_http_request_bytes(
            b"POST /v1/hero-stats HTTP/1.1\r\nContent-Length: 5\r\n\r\n{}",
        )
        .unwrap_err();
        assert!(err.contains("does not match"));
    }

    #[test]
    fn render_response_bytes_writes_headers_and_binary_body() {
        let response = HttpResponse {
            status: 200,
            headers: vec![("Content-Encoding".to_string(), "gzip".to_string())],
            body: vec![0x1f, 0x8b, 0x00],
        };
        let rendered = render_response_bytes(&response);
        let head_end = rendered
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .unwrap();
        let head = std::str::from_utf8(&rendered[..head_end]).unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Content-Encoding: gzip"));
        assert!(head.contains("Content-Length: 3"));
        assert_eq!(&rendered[head_end + 4..], &[0x1f, 0x8b, 0x00]);
    }
}
