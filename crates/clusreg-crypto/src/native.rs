//! Cluster crypto entry points, loaded from `resutils.dll`.

use std::ffi::c_void;
use std::ptr;

use clusreg_core::Status;
use libloading::{Library, Symbol};
use tracing::debug;

use crate::api::{CryptoApi, Direction, OpenFlags, ProviderType, RawAllocation, RawProvider};
use crate::error::{CryptoError, Result};
use crate::staging::StagingBuffer;

const LIBRARY: &str = "resutils.dll";

type Handle = *mut c_void;

type OpenFn = unsafe extern "system" fn(*const u16, *const u16, u32, u32) -> Handle;
type OpenExFn = unsafe extern "system" fn(*const u16, *const u16, *const u16, u32, u32) -> Handle;
type CloseFn = unsafe extern "system" fn(Handle) -> u32;
type TransformFn = unsafe extern "system" fn(Handle, *mut u8, u32, *mut *mut u8, *mut u32) -> u32;
type FreeFn = unsafe extern "system" fn(*mut c_void) -> u32;

struct Entrypoints {
    open: OpenFn,
    open_ex: OpenExFn,
    close: CloseFn,
    encrypt: TransformFn,
    decrypt: TransformFn,
    free: FreeFn,
}

/// [`CryptoApi`] backed by the cluster's resource utility library.
pub struct NativeCrypto {
    fns: Entrypoints,
    _lib: Library,
}

impl NativeCrypto {
    pub fn load() -> Result<Self> {
        let lib = unsafe { Library::new(LIBRARY) }.map_err(|e| CryptoError::Load {
            library: LIBRARY,
            detail: e.to_string(),
        })?;
        let fns = unsafe {
            Entrypoints {
                open: symbol(&lib, b"OpenClusterCryptProvider\0")?,
                open_ex: symbol(&lib, b"OpenClusterCryptProviderEx\0")?,
                close: symbol(&lib, b"CloseClusterCryptProvider\0")?,
                encrypt: symbol(&lib, b"ClusterEncrypt\0")?,
                decrypt: symbol(&lib, b"ClusterDecrypt\0")?,
                free: symbol(&lib, b"FreeClusterCrypt\0")?,
            }
        };
        debug!(library = LIBRARY, "loaded crypto entry points");
        Ok(NativeCrypto { fns, _lib: lib })
    }
}

/// # Safety
/// `T` must match the exported symbol's signature.
unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
    let sym: Symbol<T> = lib.get(name).map_err(|e| CryptoError::Load {
        library: LIBRARY,
        detail: e.to_string(),
    })?;
    Ok(*sym)
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

impl CryptoApi for NativeCrypto {
    fn open_provider(
        &self,
        resource: &str,
        key: Option<&str>,
        provider: &str,
        provider_type: ProviderType,
        flags: OpenFlags,
    ) -> std::result::Result<RawProvider, Status> {
        let resource = wide(resource);
        let provider = wide(provider);
        let handle = match key {
            Some(key) => {
                let key = wide(key);
                unsafe {
                    (self.fns.open_ex)(
                        resource.as_ptr(),
                        key.as_ptr(),
                        provider.as_ptr(),
                        provider_type.0,
                        flags.0,
                    )
                }
            }
            None => unsafe {
                (self.fns.open)(resource.as_ptr(), provider.as_ptr(), provider_type.0, flags.0)
            },
        };
        if handle.is_null() {
            let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(Status::from_raw(code as u32));
        }
        Ok(RawProvider(handle as usize))
    }

    fn close_provider(&self, provider: RawProvider) -> std::result::Result<(), Status> {
        Status::check(unsafe { (self.fns.close)(provider.0 as Handle) })
    }

    fn transform(
        &self,
        provider: RawProvider,
        direction: Direction,
        input: &StagingBuffer,
    ) -> std::result::Result<RawAllocation, Status> {
        let call = match direction {
            Direction::Encrypt => self.fns.encrypt,
            Direction::Decrypt => self.fns.decrypt,
        };
        let len = u32::try_from(input.len()).map_err(|_| Status::INVALID_PARAMETER)?;
        let mut out: *mut u8 = ptr::null_mut();
        let mut out_len = 0u32;
        // The provider only reads the input despite the mutable pointer type.
        Status::check(unsafe {
            call(
                provider.0 as Handle,
                input.as_ptr().cast_mut(),
                len,
                &mut out,
                &mut out_len,
            )
        })?;
        Ok(RawAllocation {
            address: out as usize,
            len: out_len as usize,
        })
    }

    fn copy_out(&self, allocation: RawAllocation, out: &mut [u8]) -> std::result::Result<(), Status> {
        if out.len() != allocation.len {
            return Err(Status::INVALID_PARAMETER);
        }
        if allocation.len == 0 {
            return Ok(());
        }
        if allocation.address == 0 {
            return Err(Status::INVALID_PARAMETER);
        }
        unsafe {
            ptr::copy_nonoverlapping(allocation.address as *const u8, out.as_mut_ptr(), allocation.len);
        }
        Ok(())
    }

    fn free(&self, allocation: RawAllocation) -> std::result::Result<(), Status> {
        if allocation.address == 0 {
            return Ok(());
        }
        Status::check(unsafe { (self.fns.free)(allocation.address as *mut c_void) })
    }
}
