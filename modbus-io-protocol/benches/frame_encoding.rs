use std::hint::black_box;
use std::io::Cursor;

use criterion::{Criterion, criterion_group, criterion_main};
use modbus_io_protocol::{Frame, Header, Request, Response, ResponseFrame};

fn decode_requests(c: &mut Criterion) {
    let read = Frame {
        header: Header {
            transaction_id: 1,
            unit_id: 1,
        },
        request: Request::ReadInputRegisters {
            address: 0,
            quantity: 6,
        },
    }
    .to_bytes();
    let write = Frame {
        header: Header {
            transaction_id: 2,
            unit_id: 1,
        },
        request: Request::WriteMultipleRegisters {
            address: 0,
            values: vec![0x1234; 123].into_boxed_slice(),
        },
    }
    .to_bytes();

    c.bench_function("decode read input registers", |b| {
        b.iter(|| Frame::from_reader(&mut Cursor::new(black_box(&read[..]))))
    });
    c.bench_function("decode write 123 registers", |b| {
        b.iter(|| Frame::from_reader(&mut Cursor::new(black_box(&write[..]))))
    });
}

fn encode_responses(c: &mut Criterion) {
    let coils = ResponseFrame {
        header: Header::default(),
        response: Response::ReadCoils(vec![true; 2000].into_boxed_slice()),
    };
    let registers = ResponseFrame {
        header: Header::default(),
        response: Response::ReadHoldingRegisters(vec![500; 125].into_boxed_slice()),
    };

    c.bench_function("encode 2000 coils", |b| {
        b.iter(|| black_box(&coils).to_bytes())
    });
    c.bench_function("encode 125 registers", |b| {
        b.iter(|| black_box(&registers).to_bytes())
    });
}

criterion_group!(benches, decode_requests, encode_responses);
criterion_main!(benches);
