//! The cluster service's own registry entry points, loaded from `clusapi.dll`.

use std::ffi::c_void;
use std::ptr;

use clusreg_core::{Status, ValueType};
use libloading::{Library, Symbol};
use tracing::debug;

use crate::api::{
    AccessMask, BatchClose, ClusterApi, CommandKind, Disposition, EnumeratedValue, QueriedValue,
    RawBatch, RawCluster, RawKey, RawResource,
};
use crate::error::{Result, StoreError};

const LIBRARY: &str = "clusapi.dll";

type Handle = *mut c_void;

type OpenClusterFn = unsafe extern "system" fn(*const u16) -> Handle;
type CloseHandleFn = unsafe extern "system" fn(Handle) -> i32;
type OpenResourceFn = unsafe extern "system" fn(Handle, *const u16) -> Handle;
type GetKeyFn = unsafe extern "system" fn(Handle, u32) -> Handle;
type CreateKeyFn = unsafe extern "system" fn(
    Handle,
    *const u16,
    u32,
    u32,
    *mut c_void,
    *mut Handle,
    *mut u32,
) -> i32;
type OpenKeyFn = unsafe extern "system" fn(Handle, *const u16, u32, *mut Handle) -> i32;
type NamedFn = unsafe extern "system" fn(Handle, *const u16) -> i32;
type CloseKeyFn = unsafe extern "system" fn(Handle) -> i32;
type SetValueFn = unsafe extern "system" fn(Handle, *const u16, u32, *const u8, u32) -> u32;
type QueryValueFn = unsafe extern "system" fn(Handle, *const u16, *mut u32, *mut u8, *mut u32) -> i32;
type EnumValueFn = unsafe extern "system" fn(
    Handle,
    u32,
    *mut u16,
    *mut u32,
    *mut u32,
    *mut u8,
    *mut u32,
) -> u32;
type EnumKeyFn = unsafe extern "system" fn(Handle, u32, *mut u16, *mut u32, *mut c_void) -> i32;
type CreateBatchFn = unsafe extern "system" fn(Handle, *mut Handle) -> i32;
type BatchAddFn =
    unsafe extern "system" fn(Handle, u32, *const u16, u32, *const c_void, u32) -> i32;
type CloseBatchFn = unsafe extern "system" fn(Handle, i32, *mut i32) -> i32;

struct Entrypoints {
    open_cluster: OpenClusterFn,
    close_cluster: CloseHandleFn,
    open_resource: OpenResourceFn,
    close_resource: CloseHandleFn,
    cluster_key: GetKeyFn,
    resource_key: GetKeyFn,
    create_key: CreateKeyFn,
    open_key: OpenKeyFn,
    delete_key: NamedFn,
    close_key: CloseKeyFn,
    set_value: SetValueFn,
    delete_value: NamedFn,
    query_value: QueryValueFn,
    enum_value: EnumValueFn,
    enum_key: EnumKeyFn,
    create_batch: CreateBatchFn,
    batch_add: BatchAddFn,
    close_batch: CloseBatchFn,
}

/// [`ClusterApi`] backed by the cluster service.
pub struct NativeCluster {
    fns: Entrypoints,
    // Keeps the entry points above valid.
    _lib: Library,
}

impl NativeCluster {
    /// Load `clusapi.dll` and resolve every entry point up front.
    pub fn load() -> Result<Self> {
        let lib = unsafe { Library::new(LIBRARY) }.map_err(|e| StoreError::Load {
            library: LIBRARY,
            detail: e.to_string(),
        })?;
        let fns = unsafe {
            Entrypoints {
                open_cluster: symbol(&lib, b"OpenCluster\0")?,
                close_cluster: symbol(&lib, b"CloseCluster\0")?,
                open_resource: symbol(&lib, b"OpenClusterResource\0")?,
                close_resource: symbol(&lib, b"CloseClusterResource\0")?,
                cluster_key: symbol(&lib, b"GetClusterKey\0")?,
                resource_key: symbol(&lib, b"GetClusterResourceKey\0")?,
                create_key: symbol(&lib, b"ClusterRegCreateKey\0")?,
                open_key: symbol(&lib, b"ClusterRegOpenKey\0")?,
                delete_key: symbol(&lib, b"ClusterRegDeleteKey\0")?,
                close_key: symbol(&lib, b"ClusterRegCloseKey\0")?,
                set_value: symbol(&lib, b"ClusterRegSetValue\0")?,
                delete_value: symbol(&lib, b"ClusterRegDeleteValue\0")?,
                query_value: symbol(&lib, b"ClusterRegQueryValue\0")?,
                enum_value: symbol(&lib, b"ClusterRegEnumValue\0")?,
                enum_key: symbol(&lib, b"ClusterRegEnumKey\0")?,
                create_batch: symbol(&lib, b"ClusterRegCreateBatch\0")?,
                batch_add: symbol(&lib, b"ClusterRegBatchAddCommand\0")?,
                close_batch: symbol(&lib, b"ClusterRegCloseBatch\0")?,
            }
        };
        debug!(library = LIBRARY, "loaded cluster entry points");
        Ok(NativeCluster { fns, _lib: lib })
    }
}

/// Copy a function pointer out of the library.
///
/// # Safety
/// `T` must match the exported symbol's signature.
unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
    let sym: Symbol<T> = lib.get(name).map_err(|e| StoreError::Load {
        library: LIBRARY,
        detail: e.to_string(),
    })?;
    Ok(*sym)
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn last_error() -> Status {
    let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
    Status::from_raw(code as u32)
}

fn handle_or_last_error(handle: Handle) -> std::result::Result<usize, Status> {
    if handle.is_null() {
        Err(last_error())
    } else {
        Ok(handle as usize)
    }
}

fn status(code: i32) -> std::result::Result<(), Status> {
    Status::check(code as u32)
}

fn bool_result(ok: i32) -> std::result::Result<(), Status> {
    if ok != 0 {
        Ok(())
    } else {
        Err(last_error())
    }
}

fn as_handle(raw: usize) -> Handle {
    raw as Handle
}

impl ClusterApi for NativeCluster {
    fn open_cluster(&self, name: Option<&str>) -> std::result::Result<RawCluster, Status> {
        let name = name.map(wide);
        let ptr = name.as_ref().map_or(ptr::null(), |n| n.as_ptr());
        let handle = unsafe { (self.fns.open_cluster)(ptr) };
        handle_or_last_error(handle).map(RawCluster)
    }

    fn close_cluster(&self, cluster: RawCluster) -> std::result::Result<(), Status> {
        bool_result(unsafe { (self.fns.close_cluster)(as_handle(cluster.0)) })
    }

    fn open_resource(&self, cluster: RawCluster, name: &str) -> std::result::Result<RawResource, Status> {
        let name = wide(name);
        let handle = unsafe { (self.fns.open_resource)(as_handle(cluster.0), name.as_ptr()) };
        handle_or_last_error(handle).map(RawResource)
    }

    fn close_resource(&self, resource: RawResource) -> std::result::Result<(), Status> {
        bool_result(unsafe { (self.fns.close_resource)(as_handle(resource.0)) })
    }

    fn cluster_key(&self, cluster: RawCluster, access: AccessMask) -> std::result::Result<RawKey, Status> {
        let handle = unsafe { (self.fns.cluster_key)(as_handle(cluster.0), access.0) };
        handle_or_last_error(handle).map(RawKey)
    }

    fn resource_key(&self, resource: RawResource, access: AccessMask) -> std::result::Result<RawKey, Status> {
        let handle = unsafe { (self.fns.resource_key)(as_handle(resource.0), access.0) };
        handle_or_last_error(handle).map(RawKey)
    }

    fn create_key(
        &self,
        key: RawKey,
        name: &str,
        access: AccessMask,
    ) -> std::result::Result<(RawKey, Disposition), Status> {
        let name = wide(name);
        let mut out: Handle = ptr::null_mut();
        let mut disposition = 0u32;
        status(unsafe {
            (self.fns.create_key)(
                as_handle(key.0),
                name.as_ptr(),
                0,
                access.0,
                ptr::null_mut(),
                &mut out,
                &mut disposition,
            )
        })?;
        let disposition = Disposition::from_raw(disposition).unwrap_or(Disposition::OpenedExisting);
        Ok((RawKey(out as usize), disposition))
    }

    fn open_key(&self, key: RawKey, name: &str, access: AccessMask) -> std::result::Result<RawKey, Status> {
        let name = wide(name);
        let mut out: Handle = ptr::null_mut();
        status(unsafe { (self.fns.open_key)(as_handle(key.0), name.as_ptr(), access.0, &mut out) })?;
        Ok(RawKey(out as usize))
    }

    fn delete_key(&self, key: RawKey, name: &str) -> std::result::Result<(), Status> {
        let name = wide(name);
        status(unsafe { (self.fns.delete_key)(as_handle(key.0), name.as_ptr()) })
    }

    fn close_key(&self, key: RawKey) -> std::result::Result<(), Status> {
        status(unsafe { (self.fns.close_key)(as_handle(key.0)) })
    }

    fn set_value(
        &self,
        key: RawKey,
        name: &str,
        value_type: ValueType,
        data: &[u8],
    ) -> std::result::Result<(), Status> {
        let name = wide(name);
        let len = u32::try_from(data.len()).map_err(|_| Status::INVALID_PARAMETER)?;
        Status::check(unsafe {
            (self.fns.set_value)(as_handle(key.0), name.as_ptr(), value_type.0, data.as_ptr(), len)
        })
    }

    fn delete_value(&self, key: RawKey, name: &str) -> std::result::Result<(), Status> {
        let name = wide(name);
        status(unsafe { (self.fns.delete_value)(as_handle(key.0), name.as_ptr()) })
    }

    fn query_value(
        &self,
        key: RawKey,
        name: &str,
        data: &mut [u8],
    ) -> std::result::Result<QueriedValue, Status> {
        let name = wide(name);
        let mut value_type = 0u32;
        let mut len = u32::try_from(data.len()).map_err(|_| Status::INVALID_PARAMETER)?;
        status(unsafe {
            (self.fns.query_value)(
                as_handle(key.0),
                name.as_ptr(),
                &mut value_type,
                data.as_mut_ptr(),
                &mut len,
            )
        })?;
        Ok(QueriedValue {
            value_type: ValueType(value_type),
            data_len: len as usize,
        })
    }

    fn enum_value(
        &self,
        key: RawKey,
        index: u32,
        name: &mut [u16],
        data: &mut [u8],
    ) -> std::result::Result<EnumeratedValue, Status> {
        let mut name_len = u32::try_from(name.len()).map_err(|_| Status::INVALID_PARAMETER)?;
        let mut data_len = u32::try_from(data.len()).map_err(|_| Status::INVALID_PARAMETER)?;
        let mut value_type = 0u32;
        Status::check(unsafe {
            (self.fns.enum_value)(
                as_handle(key.0),
                index,
                name.as_mut_ptr(),
                &mut name_len,
                &mut value_type,
                data.as_mut_ptr(),
                &mut data_len,
            )
        })?;
        Ok(EnumeratedValue {
            value_type: ValueType(value_type),
            name_len: name_len as usize,
            data_len: data_len as usize,
        })
    }

    fn enum_key(&self, key: RawKey, index: u32, name: &mut [u16]) -> std::result::Result<usize, Status> {
        let mut name_len = u32::try_from(name.len()).map_err(|_| Status::INVALID_PARAMETER)?;
        status(unsafe {
            (self.fns.enum_key)(
                as_handle(key.0),
                index,
                name.as_mut_ptr(),
                &mut name_len,
                ptr::null_mut(),
            )
        })?;
        Ok(name_len as usize)
    }

    fn create_batch(&self, key: RawKey) -> std::result::Result<RawBatch, Status> {
        let mut out: Handle = ptr::null_mut();
        status(unsafe { (self.fns.create_batch)(as_handle(key.0), &mut out) })?;
        Ok(RawBatch(out as usize))
    }

    fn batch_add_command(
        &self,
        batch: RawBatch,
        kind: CommandKind,
        name: &str,
        value_type: ValueType,
        data: &[u8],
    ) -> std::result::Result<(), Status> {
        let name = wide(name);
        let len = u32::try_from(data.len()).map_err(|_| Status::INVALID_PARAMETER)?;
        let data_ptr = if data.is_empty() {
            ptr::null()
        } else {
            data.as_ptr().cast::<c_void>()
        };
        status(unsafe {
            (self.fns.batch_add)(
                as_handle(batch.0),
                kind.code(),
                name.as_ptr(),
                value_type.0,
                data_ptr,
                len,
            )
        })
    }

    fn close_batch(&self, batch: RawBatch, commit: bool) -> BatchClose {
        let mut failed_command = 0i32;
        let code = unsafe {
            (self.fns.close_batch)(as_handle(batch.0), i32::from(commit), &mut failed_command)
        };
        BatchClose {
            status: Status::from_raw(code as u32),
            failed_command,
        }
    }
}
