use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

const INVOICE: &str = "From: billing@example.com\r\n\
To: me@example.com\r\n\
Subject: Invoice\r\n\
Message-ID: <inv-2024-03@example.com>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain\r\n\
\r\n\
Invoice attached.\r\n\
--XYZ\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"Invoice March (final).pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--XYZ--\r\n";

fn bench_sanitize(c: &mut Criterion) {
    let names = [
        "invoice.pdf",
        "My File? <1>.PDF",
        "C:\\Users\\someone\\Documents\\quarterly   report  v2.pdf",
    ];

    c.bench_function("sanitize_filename", |b| {
        b.iter(|| {
            for name in &names {
                black_box(attachpoll::export::filename::sanitize_filename(
                    black_box(name),
                    Some("pdf"),
                ));
            }
        })
    });
}

fn bench_list_parts(c: &mut Criterion) {
    c.bench_function("list_parts_invoice", |b| {
        b.iter(|| attachpoll::parser::mime::list_parts(black_box(INVOICE.as_bytes())))
    });
}

criterion_group!(benches, bench_sanitize, bench_list_parts);
criterion_main!(benches);
