pub mod caller;

pub use caller::{
    USER_EMAIL_HEADER, USER_ID_HEADER, USER_NAME_HEADER, USER_PHONE_HEADER, USER_ROLE_HEADER,
};
