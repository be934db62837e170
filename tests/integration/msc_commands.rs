//! Integration tests for the storage-class command surface

use flashbridge::block::HeapBlockDevice;
use flashbridge::scsi::{
    HostCommand, HostReply, InquiryData, MassStorage, ScriptedTransport, SenseData, Transport,
};

fn unit() -> MassStorage<HeapBlockDevice> {
    MassStorage::new(
        HeapBlockDevice::new(8192, 512),
        InquiryData::new("TinyUSB", "Mass Storage", "1.0"),
    )
}

fn drive(msc: &mut MassStorage<HeapBlockDevice>, script: Vec<HostCommand>) -> Vec<HostReply> {
    let mut transport = ScriptedTransport::new();
    for cmd in script {
        transport.push(cmd);
    }
    while !transport.is_drained() {
        transport.service(msc);
    }
    transport.replies().to_vec()
}

#[test]
fn identification_and_capacity_requests() {
    let mut msc = unit();
    let replies = drive(&mut msc, vec![HostCommand::Inquiry, HostCommand::ReadCapacity]);

    match &replies[0] {
        HostReply::Inquiry(inq) => assert_eq!(&inq.vendor_id, b"TinyUSB "),
        other => panic!("unexpected reply {other:?}"),
    }
    match &replies[1] {
        HostReply::Capacity(cap) => {
            assert_eq!(cap.block_count, 16);
            assert_eq!(cap.block_size, 512);
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn written_blocks_read_back_identically() {
    let mut msc = unit();
    let payload = vec![0xC3; 1024];
    let replies = drive(
        &mut msc,
        vec![
            HostCommand::Write {
                lba: 4,
                data: payload.clone(),
            },
            HostCommand::Read { lba: 4, blocks: 2 },
        ],
    );

    assert_eq!(replies[0], HostReply::Done);
    assert_eq!(replies[1], HostReply::Data(payload));
}

#[test]
fn eject_sequence_fails_readiness_queries() {
    let mut msc = unit();
    let replies = drive(
        &mut msc,
        vec![
            HostCommand::TestUnitReady,
            HostCommand::StartStop {
                start: false,
                load_eject: true,
            },
            HostCommand::TestUnitReady,
        ],
    );

    assert_eq!(replies[0], HostReply::Ready);
    assert_eq!(replies[1], HostReply::Done);
    assert_eq!(
        replies[2],
        HostReply::NotReady(SenseData::MEDIUM_NOT_PRESENT)
    );
}

#[test]
fn maintenance_commands_report_unsupported_without_crashing() {
    let mut msc = unit();
    let mut cdb = [0u8; 16];
    cdb[0] = 0x35; // SYNCHRONIZE CACHE
    let replies = drive(
        &mut msc,
        vec![HostCommand::Passthrough(cdb), HostCommand::TestUnitReady],
    );

    assert_eq!(
        replies[0],
        HostReply::Unsupported(SenseData::INVALID_COMMAND)
    );
    // The unit keeps answering after the unsupported command.
    assert_eq!(replies[1], HostReply::Ready);
}

#[test]
fn out_of_range_read_is_served_zero_filled() {
    let mut msc = unit();
    let replies = drive(&mut msc, vec![HostCommand::Read { lba: 100, blocks: 1 }]);
    assert_eq!(replies[0], HostReply::Data(vec![0u8; 512]));
}
