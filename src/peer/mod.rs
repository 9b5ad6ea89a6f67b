//! Peer-credential resolution.
//!
//! Resolves a connected UNIX-domain socket's kernel peer credentials to a
//! user name and the full set of groups that user belongs to (primary
//! group union supplementary groups).

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use tokio::net::UnixStream;

/// A peer's resolved identity: user name and the union of their primary and
/// supplementary groups. Lifetime equals the session that resolved it.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    pub user: String,
    pub groups: HashSet<String>,
}

/// Resolve the peer identity of an accepted UNIX-domain connection.
///
/// Fails if the kernel provides no peer credentials or if UID/GID name
/// resolution fails; the session treats this as fatal.
pub fn resolve(stream: &UnixStream) -> Result<PeerIdentity> {
    let cred = stream
        .peer_cred()
        .map_err(|e| Error::PeerResolution(format!("no peer credentials: {e}")))?;

    let user = username_for_uid(cred.uid())?;
    let primary_group = groupname_for_gid(cred.gid())?;

    let mut groups = HashSet::new();
    groups.insert(primary_group);
    groups.extend(supplementary_groups(&user, cred.gid())?);

    Ok(PeerIdentity { user, groups })
}

fn username_for_uid(uid: u32) -> Result<String> {
    unsafe {
        let mut buf = vec![0i8; 16384];
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = libc::getpwuid_r(
            uid,
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        );

        if rc != 0 || result.is_null() {
            return Err(Error::PeerResolution(format!(
                "no passwd entry for uid {uid}"
            )));
        }

        Ok(CStr::from_ptr(pwd.pw_name).to_string_lossy().into_owned())
    }
}

fn groupname_for_gid(gid: u32) -> Result<String> {
    unsafe {
        let mut buf = vec![0i8; 16384];
        let mut grp: libc::group = std::mem::zeroed();
        let mut result: *mut libc::group = std::ptr::null_mut();

        let rc = libc::getgrgid_r(
            gid,
            &mut grp,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        );

        if rc != 0 || result.is_null() {
            return Err(Error::PeerResolution(format!(
                "no group entry for gid {gid}"
            )));
        }

        Ok(CStr::from_ptr(grp.gr_name).to_string_lossy().into_owned())
    }
}

/// Every group (by name) that lists `user` as a member, via
/// `getgrouplist(3)`, resolved to group names via `getgrgid`. `base_gid` is
/// the peer's real primary gid; `getgrouplist` always includes it in the
/// returned set, so it must be the peer's own, never a placeholder.
fn supplementary_groups(user: &str, base_gid: u32) -> Result<HashSet<String>> {
    let c_user = CString::new(user)
        .map_err(|_| Error::PeerResolution("user name contains NUL byte".to_string()))?;

    let mut ngroups: libc::c_int = 32;
    let mut gids: Vec<libc::gid_t> = vec![0; ngroups as usize];

    unsafe {
        let rc = libc::getgrouplist(
            c_user.as_ptr(),
            base_gid,
            gids.as_mut_ptr(),
            &mut ngroups,
        );
        if rc < 0 {
            // Buffer was too small; retry with the size the kernel reported.
            gids.resize(ngroups as usize, 0);
            let rc2 = libc::getgrouplist(
                c_user.as_ptr(),
                base_gid,
                gids.as_mut_ptr(),
                &mut ngroups,
            );
            if rc2 < 0 {
                return Err(Error::PeerResolution(format!(
                    "getgrouplist failed for user {user}"
                )));
            }
        }
    }
    gids.truncate(ngroups.max(0) as usize);

    let mut names = HashSet::new();
    for gid in gids {
        if let Ok(name) = groupname_for_gid(gid) {
            names.insert(name);
        }
    }
    Ok(names)
}
