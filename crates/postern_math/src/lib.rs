pub mod frustum;
pub mod plane;
pub mod projection;
pub mod rigid;
