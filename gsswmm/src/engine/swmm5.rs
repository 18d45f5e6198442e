//! Binding to the SWMM 5.2 shared library.
//!
//! The library is loaded the first time a model is opened and stays loaded for as long as the
//! [`Swmm5`] value lives. The LID unit accessors are an extension that stock SWMM builds do not
//! export, so they are looked up separately and may be missing. The extension consists of the
//! count, name, storage volume, surface inflow and surface outflow accessors; the drain flow
//! accessor is only present in some builds and is looked up on its own.

use super::{Engine, EngineError, EngineObject, EngineProperty, NestedProperty, StepOutcome};
use libloading::Library;
use std::ffi::{c_char, c_double, c_int, CString};
use std::path::{Path, PathBuf};

/// Size of the buffers handed to the library for error messages and names.
const TEXT_CAPACITY: usize = 256;

/// Error code used for failures that happen before the library is reachable.
const LOAD_ERROR: c_int = -1;

type OpenFn = unsafe extern "C" fn(*const c_char, *const c_char, *const c_char) -> c_int;
type StartFn = unsafe extern "C" fn(c_int) -> c_int;
type StepFn = unsafe extern "C" fn(*mut c_double) -> c_int;
type VoidFn = unsafe extern "C" fn() -> c_int;
type GetIndexFn = unsafe extern "C" fn(c_int, *const c_char) -> c_int;
type GetCountFn = unsafe extern "C" fn(c_int) -> c_int;
type GetValueFn = unsafe extern "C" fn(c_int, c_int) -> c_double;
type SetValueFn = unsafe extern "C" fn(c_int, c_int, c_double);
type GetErrorFn = unsafe extern "C" fn(*mut c_char, c_int) -> c_int;
type LidCountFn = unsafe extern "C" fn(c_int) -> c_int;
type LidNameFn = unsafe extern "C" fn(c_int, c_int, *mut c_char, c_int);
type LidValueFn = unsafe extern "C" fn(c_int, c_int) -> c_double;

/// Source of exported functions, by NUL-terminated symbol name.
trait Symbols {
    /// # Safety
    ///
    /// `T` must match the signature of the exported symbol.
    unsafe fn lookup<T: Copy>(&self, name: &[u8]) -> Option<T>;
}

impl Symbols for Library {
    unsafe fn lookup<T: Copy>(&self, name: &[u8]) -> Option<T> {
        symbol(self, name).ok()
    }
}

struct LidApi {
    count: LidCountFn,
    name: LidNameFn,
    storage_volume: LidValueFn,
    surface_inflow: LidValueFn,
    surface_outflow: LidValueFn,
    drain_flow: Option<LidValueFn>,
}

impl LidApi {
    /// Looks up the LID unit accessors. Returns [`None`] if any of the five core ones is missing.
    ///
    /// # Safety
    ///
    /// The symbols, when present, must follow the LID extension signatures.
    unsafe fn load<S: Symbols>(symbols: &S) -> Option<Self> {
        let api = Self {
            count: symbols.lookup(b"swmm_getLidUCount\0")?,
            name: symbols.lookup(b"swmm_getLidUName\0")?,
            storage_volume: symbols.lookup(b"swmm_getLidUStorageVolume\0")?,
            surface_inflow: symbols.lookup(b"swmm_getLidUSurfaceInflow\0")?,
            surface_outflow: symbols.lookup(b"swmm_getLidUSurfaceOutflow\0")?,
            drain_flow: symbols.lookup(b"swmm_getLidUDrainFlow\0"),
        };
        if api.drain_flow.is_none() {
            tracing::debug!("engine library does not export swmm_getLidUDrainFlow");
        }
        Some(api)
    }

    fn accessor(&self, property: NestedProperty) -> Option<LidValueFn> {
        match property {
            NestedProperty::StorageVolume => Some(self.storage_volume),
            NestedProperty::SurfaceInflow => Some(self.surface_inflow),
            NestedProperty::SurfaceOutflow => Some(self.surface_outflow),
            NestedProperty::DrainFlow => self.drain_flow,
        }
    }

    fn count(&self, container: usize) -> usize {
        let count = unsafe { (self.count)(container as c_int) };
        usize::try_from(count).unwrap_or(0)
    }

    fn name(&self, container: usize, device: usize) -> Option<String> {
        let mut buffer = [0 as c_char; TEXT_CAPACITY];
        unsafe {
            (self.name)(
                container as c_int,
                device as c_int,
                buffer.as_mut_ptr(),
                TEXT_CAPACITY as c_int,
            )
        };
        let name = read_text(&buffer);
        (!name.is_empty()).then_some(name)
    }

    fn value(&self, property: NestedProperty, container: usize, device: usize) -> f64 {
        match self.accessor(property) {
            Some(accessor) => unsafe { accessor(container as c_int, device as c_int) },
            None => 0.0,
        }
    }
}

struct Api {
    open: OpenFn,
    start: StartFn,
    step: StepFn,
    end: VoidFn,
    close: VoidFn,
    get_index: GetIndexFn,
    get_count: GetCountFn,
    get_value: GetValueFn,
    set_value: SetValueFn,
    get_error: GetErrorFn,
    lid: Option<LidApi>,
    // Keeps the function pointers above valid.
    _library: Library,
}

/// Copies a function pointer out of the library.
///
/// # Safety
///
/// `T` must match the signature of the exported symbol.
unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T, libloading::Error> {
    library.get::<T>(name).map(|s| *s)
}

impl Api {
    fn load(path: &Path) -> Result<Self, EngineError> {
        let library = unsafe { Library::new(path) }.map_err(|e| {
            EngineError::new(
                LOAD_ERROR,
                format!("cannot load engine library {}: {e}", path.display()),
            )
        })?;
        let missing = |e: libloading::Error| {
            EngineError::new(
                LOAD_ERROR,
                format!("engine library {} is incomplete: {e}", path.display()),
            )
        };
        // SAFETY: the type aliases follow the SWMM 5.2 toolkit header.
        unsafe {
            let lid = LidApi::load(&library);
            if lid.is_none() {
                tracing::debug!("engine library does not export the LID unit accessors");
            }
            Ok(Self {
                open: symbol(&library, b"swmm_open\0").map_err(missing)?,
                start: symbol(&library, b"swmm_start\0").map_err(missing)?,
                step: symbol(&library, b"swmm_step\0").map_err(missing)?,
                end: symbol(&library, b"swmm_end\0").map_err(missing)?,
                close: symbol(&library, b"swmm_close\0").map_err(missing)?,
                get_index: symbol(&library, b"swmm_getIndex\0").map_err(missing)?,
                get_count: symbol(&library, b"swmm_getCount\0").map_err(missing)?,
                get_value: symbol(&library, b"swmm_getValue\0").map_err(missing)?,
                set_value: symbol(&library, b"swmm_setValue\0").map_err(missing)?,
                get_error: symbol(&library, b"swmm_getError\0").map_err(missing)?,
                lid,
                _library: library,
            })
        }
    }

    /// Builds an [`EngineError`] from a nonzero return code and the library's error text.
    fn error(&self, code: c_int) -> EngineError {
        let mut buffer = [0 as c_char; TEXT_CAPACITY];
        // SAFETY: the buffer length is passed along with the pointer.
        unsafe { (self.get_error)(buffer.as_mut_ptr(), TEXT_CAPACITY as c_int) };
        let text = read_text(&buffer);
        if text.is_empty() {
            EngineError::new(code, format!("SWMM error {code}"))
        } else {
            EngineError::new(code, text)
        }
    }

    fn check(&self, code: c_int) -> Result<(), EngineError> {
        match code {
            0 => Ok(()),
            code => Err(self.error(code)),
        }
    }
}

fn read_text(buffer: &[c_char]) -> String {
    let bytes: Vec<u8> = buffer
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

fn c_path(path: &Path) -> Result<CString, EngineError> {
    CString::new(path.to_string_lossy().into_owned()).map_err(|_| {
        EngineError::new(
            LOAD_ERROR,
            format!("path {} contains a NUL byte", path.display()),
        )
    })
}

/// [`Engine`] backed by the SWMM 5.2 shared library.
pub struct Swmm5 {
    library_path: PathBuf,
    api: Option<Api>,
}

impl std::fmt::Debug for Swmm5 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swmm5")
            .field("library_path", &self.library_path)
            .field("loaded", &self.api.is_some())
            .finish()
    }
}

impl Swmm5 {
    /// Creates a binding to the library at `library_path`. Nothing is loaded yet.
    pub fn new<P: Into<PathBuf>>(library_path: P) -> Self {
        Self {
            library_path: library_path.into(),
            api: None,
        }
    }

    /// Returns the path of the shared library.
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    fn lid(&self) -> Option<&LidApi> {
        self.api.as_ref()?.lid.as_ref()
    }

    fn api(&self) -> Result<&Api, EngineError> {
        self.api.as_ref().ok_or_else(|| {
            EngineError::new(LOAD_ERROR, "the engine library has not been loaded")
        })
    }
}

impl Engine for Swmm5 {
    fn open(&mut self, model: &Path, report: &Path, output: &Path) -> Result<(), EngineError> {
        if self.api.is_none() {
            tracing::info!("loading engine library {}", self.library_path.display());
            self.api = Some(Api::load(&self.library_path)?);
        }
        let api = self.api()?;
        let (model, report, output) = (c_path(model)?, c_path(report)?, c_path(output)?);
        let code = unsafe { (api.open)(model.as_ptr(), report.as_ptr(), output.as_ptr()) };
        api.check(code)
    }

    fn start(&mut self, save_results: bool) -> Result<(), EngineError> {
        let api = self.api()?;
        let code = unsafe { (api.start)(c_int::from(save_results)) };
        api.check(code)
    }

    fn step(&mut self) -> Result<StepOutcome, EngineError> {
        let api = self.api()?;
        let mut elapsed: c_double = 0.0;
        let code = unsafe { (api.step)(&mut elapsed) };
        api.check(code)?;
        if elapsed > 0.0 {
            Ok(StepOutcome::Advanced {
                elapsed_days: elapsed,
            })
        } else {
            Ok(StepOutcome::Finished)
        }
    }

    fn end(&mut self) -> Result<(), EngineError> {
        let api = self.api()?;
        let code = unsafe { (api.end)() };
        api.check(code)
    }

    fn close(&mut self) -> Result<(), EngineError> {
        let api = self.api()?;
        let code = unsafe { (api.close)() };
        api.check(code)
    }

    fn index_of(&self, object: EngineObject, name: &str) -> Option<usize> {
        let api = self.api.as_ref()?;
        let name = CString::new(name).ok()?;
        let index = unsafe { (api.get_index)(object.code(), name.as_ptr()) };
        usize::try_from(index).ok()
    }

    fn count(&self, object: EngineObject) -> usize {
        self.api
            .as_ref()
            .map(|api| unsafe { (api.get_count)(object.code()) })
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
    }

    fn value(&self, property: EngineProperty, index: usize) -> f64 {
        match &self.api {
            Some(api) => unsafe { (api.get_value)(property.code(), index as c_int) },
            None => 0.0,
        }
    }

    fn set_value(&mut self, property: EngineProperty, index: usize, value: f64) {
        if let Some(api) = &self.api {
            unsafe { (api.set_value)(property.code(), index as c_int, value) };
        }
    }

    fn nested_count(&self, container: usize) -> Option<usize> {
        Some(self.lid()?.count(container))
    }

    fn nested_name(&self, container: usize, device: usize) -> Option<String> {
        self.lid()?.name(container, device)
    }

    fn nested_supports(&self, property: NestedProperty) -> bool {
        self.lid()
            .is_some_and(|lid| lid.accessor(property).is_some())
    }

    fn nested_value(&self, property: NestedProperty, container: usize, device: usize) -> f64 {
        self.lid()
            .map_or(0.0, |lid| lid.value(property, container, device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_text() {
        let mut buffer = [0 as c_char; 16];
        for (slot, byte) in buffer.iter_mut().zip(b" ERROR 200 ") {
            *slot = *byte as c_char;
        }
        assert_eq!("ERROR 200", read_text(&buffer));
        assert_eq!("", read_text(&[0 as c_char; 4]));
    }

    #[test]
    fn test_missing_library() {
        let mut engine = Swmm5::new("/nonexistent/libswmm5_missing.so");
        let err = engine
            .open(
                Path::new("model.inp"),
                Path::new("model.rpt"),
                Path::new("model.out"),
            )
            .unwrap_err();
        assert_eq!(LOAD_ERROR, err.code);
        assert!(err.message.contains("libswmm5_missing"));
        assert!(engine.step().is_err());
        assert_eq!(None, engine.index_of(EngineObject::Node, "J1"));
        assert_eq!(0, engine.count(EngineObject::Node));
        assert_eq!(None, engine.nested_count(0));
        assert!(!engine.nested_supports(NestedProperty::StorageVolume));
    }

    /// Exported functions of a fake library, by symbol name.
    struct Exports(Vec<(&'static [u8], usize)>);

    impl Symbols for Exports {
        unsafe fn lookup<T: Copy>(&self, name: &[u8]) -> Option<T> {
            let (_, address) = self.0.iter().find(|(n, _)| *n == name)?;
            assert_eq!(std::mem::size_of::<T>(), std::mem::size_of::<usize>());
            Some(std::mem::transmute_copy(address))
        }
    }

    unsafe extern "C" fn lid_count(container: c_int) -> c_int {
        if container == 0 {
            2
        } else {
            0
        }
    }

    unsafe extern "C" fn lid_name(_container: c_int, device: c_int, name: *mut c_char, size: c_int) {
        let text: &[u8] = if device == 0 { b"InfilTrench\0" } else { b"RainBarrel\0" };
        let n = text.len().min(size as usize);
        std::ptr::copy_nonoverlapping(text.as_ptr().cast::<c_char>(), name, n);
    }

    unsafe extern "C" fn lid_storage(_container: c_int, device: c_int) -> c_double {
        10.0 + device as c_double
    }

    unsafe extern "C" fn lid_inflow(_container: c_int, _device: c_int) -> c_double {
        0.5
    }

    unsafe extern "C" fn lid_outflow(_container: c_int, _device: c_int) -> c_double {
        0.25
    }

    unsafe extern "C" fn lid_drain(_container: c_int, _device: c_int) -> c_double {
        0.125
    }

    fn lid_exports() -> Exports {
        Exports(vec![
            (&b"swmm_getLidUCount\0"[..], lid_count as LidCountFn as usize),
            (&b"swmm_getLidUName\0"[..], lid_name as LidNameFn as usize),
            (&b"swmm_getLidUStorageVolume\0"[..], lid_storage as LidValueFn as usize),
            (&b"swmm_getLidUSurfaceOutflow\0"[..], lid_outflow as LidValueFn as usize),
            (&b"swmm_getLidUSurfaceInflow\0"[..], lid_inflow as LidValueFn as usize),
        ])
    }

    #[test]
    fn test_lid_without_drain_flow() {
        let lid = unsafe { LidApi::load(&lid_exports()) }.unwrap();
        assert_eq!(2, lid.count(0));
        assert_eq!(0, lid.count(1));
        assert_eq!(Some("RainBarrel".to_string()), lid.name(0, 1));
        assert_eq!(11.0, lid.value(NestedProperty::StorageVolume, 0, 1));
        assert_eq!(0.5, lid.value(NestedProperty::SurfaceInflow, 0, 0));
        assert_eq!(0.25, lid.value(NestedProperty::SurfaceOutflow, 0, 0));
        assert!(lid.accessor(NestedProperty::StorageVolume).is_some());
        assert!(lid.accessor(NestedProperty::DrainFlow).is_none());
        assert_eq!(0.0, lid.value(NestedProperty::DrainFlow, 0, 0));
    }

    #[test]
    fn test_lid_with_drain_flow() {
        let mut exports = lid_exports();
        exports
            .0
            .push((&b"swmm_getLidUDrainFlow\0"[..], lid_drain as LidValueFn as usize));
        let lid = unsafe { LidApi::load(&exports) }.unwrap();
        assert!(lid.accessor(NestedProperty::DrainFlow).is_some());
        assert_eq!(0.125, lid.value(NestedProperty::DrainFlow, 0, 0));
    }

    #[test]
    fn test_lid_missing_core_symbol() {
        let mut exports = lid_exports();
        exports.0.retain(|(name, _)| *name != &b"swmm_getLidUName\0"[..]);
        assert!(unsafe { LidApi::load(&exports) }.is_none());
        assert!(unsafe { LidApi::load(&Exports(Vec::new())) }.is_none());
    }
}
