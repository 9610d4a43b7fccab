use eapol_proto::{EapType, SnapHeader};
use tracing::trace;

use super::{Inbound, Key, MethodPlugin, MethodStatus};
use crate::scratch::{FrameSlice, ScratchBuffer};

/// Installed until GET_METHOD negotiates a real method
#[derive(Debug, Default)]
pub struct NullMethod;

impl MethodPlugin for NullMethod {
    fn method_type(&self) -> Option<EapType> {
        None
    }

    fn check(&self, _status: &MethodStatus, _frame: &Inbound<'_>) -> bool {
        false
    }

    fn process(&mut self, _status: &mut MethodStatus, _frame: &Inbound<'_>, _req_id: u8) {}

    fn build_response(
        &mut self,
        _status: &mut MethodStatus,
        _req_id: u8,
        _scratch: &mut ScratchBuffer,
        _snap: &SnapHeader,
    ) -> FrameSlice {
        FrameSlice::EMPTY
    }

    fn get_key(&mut self, status: &mut MethodStatus) -> Option<Key> {
        status.is_key_available = false;
        None
    }

    fn deinit(&mut self) {
        trace!("null method released");
    }
}
