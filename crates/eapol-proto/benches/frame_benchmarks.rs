use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use eapol_proto::{
    EapPacket, EapView, Frame, FrameBody, MacAddr, PMK_LEN, SnapHeader, TlsFlags, TlsFragment,
    TlsFragmentAssembler, derive_pmkid,
};

fn create_tls_request(data_len: usize) -> Vec<u8> {
    let mut type_data = vec![TlsFlags::new(true, false, false).as_u8()];
    type_data.extend_from_slice(&(data_len as u32).to_be_bytes());
    type_data.extend((0..data_len).map(|i| i as u8));
    EapPacket::request_raw(1, 13, type_data).to_eapol_frame(&SnapHeader::EAPOL)
}

fn bench_frame_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_parse");

    for data_len in [0, 64, 512, 1024].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(data_len),
            data_len,
            |b, &data_len| {
                let frame = create_tls_request(data_len);
                b.iter(|| {
                    let frame = Frame::parse(black_box(&frame)).expect("Failed to parse frame");
                    match frame.body {
                        FrameBody::Eap(body) => EapView::parse(body).expect("Failed to parse EAP"),
                        _ => unreachable!(),
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_tls_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("tls_reassembly");

    for fragments in [1usize, 4, 16].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(fragments),
            fragments,
            |b, &fragments| {
                let chunk = vec![0x16u8; 1024];
                let total = (fragments * chunk.len()) as u32;
                let mut encoded = Vec::with_capacity(fragments);
                for i in 0..fragments {
                    let first = i == 0;
                    let more = i + 1 < fragments;
                    let mut type_data = vec![TlsFlags::new(first, more, false).as_u8()];
                    if first {
                        type_data.extend_from_slice(&total.to_be_bytes());
                    }
                    type_data.extend_from_slice(&chunk);
                    encoded.push(type_data);
                }

                b.iter(|| {
                    let mut assembler = TlsFragmentAssembler::new();
                    let mut message = None;
                    for type_data in &encoded {
                        let fragment = TlsFragment::parse(type_data).expect("Failed to parse fragment");
                        message = assembler
                            .add_fragment(&fragment)
                            .expect("Failed to reassemble");
                    }
                    message
                });
            },
        );
    }

    group.finish();
}

fn bench_pmkid(c: &mut Criterion) {
    let pmk = [0x5Au8; PMK_LEN];
    let aa = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    let spa = MacAddr([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);

    c.bench_function("pmkid_derive", |b| {
        b.iter(|| derive_pmkid(black_box(&pmk), black_box(&aa), black_box(&spa)))
    });
}

criterion_group!(benches, bench_frame_parse, bench_tls_reassembly, bench_pmkid);
criterion_main!(benches);
