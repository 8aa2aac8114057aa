//! WASAPI / MMDevice backend.
//!
//! Every native call runs on the blocking pool inside its own COM scope, so the
//! async side never cares which thread it was polled on.

use crate::error::{RouterError, Result};
use crate::model::{AudioDevice, DeviceId, DeviceMap, DeviceState, ProcessId, Volume};
use crate::utils::blocking::run_blocking;
use std::ffi::c_void;
use tracing::{debug, error, info, warn};
use windows::core::{interface, IUnknown, IUnknown_Vtbl, Interface, HRESULT, HSTRING, PWSTR};
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
use windows::Win32::Media::Audio::{
    eConsole, eMultimedia, eRender, EDataFlow, ERole, IMMDevice, IMMDeviceEnumerator,
    MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::StructuredStorage::PropVariantToStringAlloc;
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_ALL,
    CLSCTX_INPROC_SERVER, COINIT_MULTITHREADED, STGM_READ,
};
use windows::Win32::System::WinRT::RoGetActivationFactory;

use super::r#trait::AudioDevicePort;

const AUDIO_POLICY_CONFIG_CLASS: &str = "Windows.Media.Internal.AudioPolicyConfig";
const MMDEVAPI_TOKEN: &str = r"\\?\SWD#MMDEVAPI#";
const DEVINTERFACE_AUDIO_RENDER: &str = "#{e6327cad-dcec-4949-ae8a-991e976a79d2}";

/// Недокументированная фабрика политик аудио (Windows 10 21H2+ / Windows 11).
/// Объявлены все слоты vtable до нужного метода, параметры неиспользуемых не важны.
#[interface("ab3d4648-e242-459f-b02f-541c70306324")]
unsafe trait IAudioPolicyConfigFactory: IUnknown {
    fn GetIids(&self) -> HRESULT;
    fn GetRuntimeClassName(&self) -> HRESULT;
    fn GetTrustLevel(&self) -> HRESULT;
    fn add_CtxVolumeChange(&self) -> HRESULT;
    fn remove_CtxVolumeChanged(&self) -> HRESULT;
    fn add_RingerVibrateStateChanged(&self) -> HRESULT;
    fn remove_RingerVibrateStateChange(&self) -> HRESULT;
    fn SetVolumeGroupGainForId(&self) -> HRESULT;
    fn GetVolumeGroupGainForId(&self) -> HRESULT;
    fn GetActiveVolumeGroupForEndpointId(&self) -> HRESULT;
    fn GetVolumeGroupsForEndpoint(&self) -> HRESULT;
    fn GetCurrentVolumeContext(&self) -> HRESULT;
    fn SetVolumeGroupMuteForId(&self) -> HRESULT;
    fn GetVolumeGroupMuteForId(&self) -> HRESULT;
    fn SetRingerVibrateState(&self) -> HRESULT;
    fn GetRingerVibrateState(&self) -> HRESULT;
    fn SetPreferredChatApplication(&self) -> HRESULT;
    fn ResetPreferredChatApplication(&self) -> HRESULT;
    fn GetPreferredChatApplication(&self) -> HRESULT;
    fn GetCurrentChatApplications(&self) -> HRESULT;
    fn add_ChatContextChanged(&self) -> HRESULT;
    fn remove_ChatContextChanged(&self) -> HRESULT;
    fn SetPersistedDefaultAudioEndpoint(
        &self,
        process_id: u32,
        flow: EDataFlow,
        role: ERole,
        device_id: *mut c_void,
    ) -> HRESULT;
    fn GetPersistedDefaultAudioEndpoint(&self) -> HRESULT;
    fn ClearAllPersistedApplicationDefaultEndpoints(&self) -> HRESULT;
}

/// COM инициализирован на время жизни значения
struct ComScope;

impl ComScope {
    fn enter() -> Result<Self> {
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }.ok()?;
        Ok(Self)
    }
}

impl Drop for ComScope {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

pub struct WasapiAudioPort;

impl WasapiAudioPort {
    pub fn new() -> Self {
        info!("Инициализация WasapiAudioPort");
        Self
    }

    fn enumerator() -> Result<IMMDeviceEnumerator> {
        let enumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_INPROC_SERVER)? };
        Ok(enumerator)
    }

    fn active_render_devices(enumerator: &IMMDeviceEnumerator) -> Result<Vec<IMMDevice>> {
        let collection = unsafe { enumerator.EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE)? };
        let count = unsafe { collection.GetCount()? };

        let mut devices = Vec::with_capacity(count as usize);
        for index in 0..count {
            match unsafe { collection.Item(index) } {
                Ok(device) => devices.push(device),
                Err(e) => debug!("Пропускаем endpoint #{}: {}", index, e),
            }
        }
        Ok(devices)
    }

    fn device_id(device: &IMMDevice) -> Result<DeviceId> {
        unsafe {
            let raw = device.GetId()?;
            let id = take_co_string(raw);
            Ok(DeviceId::new(id?))
        }
    }

    fn friendly_name(device: &IMMDevice) -> Result<String> {
        unsafe {
            let store = device.OpenPropertyStore(STGM_READ)?;
            let value = store.GetValue(&PKEY_Device_FriendlyName)?;
            let raw = PropVariantToStringAlloc(&value)?;
            take_co_string(raw)
        }
    }

    fn describe(device: &IMMDevice) -> Result<AudioDevice> {
        Ok(AudioDevice {
            id: Self::device_id(device)?,
            name: Self::friendly_name(device)?,
            state: DeviceState::Active,
        })
    }

    /// Поиск среди активных render endpoints, неактивные считаются отсутствующими
    fn find_active(id: &DeviceId) -> Result<Option<IMMDevice>> {
        let enumerator = Self::enumerator()?;
        for device in Self::active_render_devices(&enumerator)? {
            if Self::device_id(&device)? == *id {
                return Ok(Some(device));
            }
        }
        Ok(None)
    }

    fn endpoint_volume(id: &DeviceId) -> Result<Option<IAudioEndpointVolume>> {
        match Self::find_active(id)? {
            Some(device) => {
                let volume: IAudioEndpointVolume = unsafe { device.Activate(CLSCTX_ALL, None)? };
                Ok(Some(volume))
            }
            None => Ok(None),
        }
    }

    fn enumerate_blocking() -> Result<DeviceMap> {
        let _com = ComScope::enter()?;
        let enumerator = Self::enumerator()?;

        let mut devices = DeviceMap::new();
        for device in Self::active_render_devices(&enumerator)? {
            match Self::describe(&device) {
                Ok(described) => {
                    devices.insert(described.name, described.id);
                }
                Err(e) => debug!("Не удалось прочитать свойства устройства: {}", e),
            }
        }

        if devices.is_empty() {
            warn!("Активные устройства вывода не найдены");
        }
        Ok(devices)
    }

    fn assign_blocking(pid: ProcessId, id: &DeviceId) -> Result<()> {
        let _com = ComScope::enter()?;

        let class = HSTRING::from(AUDIO_POLICY_CONFIG_CLASS);
        let factory: IAudioPolicyConfigFactory = unsafe { RoGetActivationFactory(&class)? };

        let endpoint = HSTRING::from(format!(
            "{}{}{}",
            MMDEVAPI_TOKEN,
            id.as_str(),
            DEVINTERFACE_AUDIO_RENDER
        ));

        for role in [eMultimedia, eConsole] {
            // HSTRING передаётся по значению как handle, владение остаётся у `endpoint`
            let handle: *mut c_void = unsafe { std::mem::transmute_copy(&endpoint) };
            unsafe { factory.SetPersistedDefaultAudioEndpoint(pid, eRender, role, handle) }
                .ok()
                .map_err(|e| RouterError::assign_failed(pid, e.message()))?;
        }
        Ok(())
    }
}

/// Копирует строку, выделенную COM, и освобождает её
unsafe fn take_co_string(raw: PWSTR) -> Result<String> {
    let text = raw.to_string();
    CoTaskMemFree(Some(raw.0 as *const c_void));
    text.map_err(|e| RouterError::Internal(format!("некорректная UTF-16 строка: {}", e)))
}

#[async_trait::async_trait]
impl AudioDevicePort for WasapiAudioPort {
    async fn list_output_devices(&self) -> DeviceMap {
        match run_blocking(Self::enumerate_blocking).await {
            Ok(devices) => devices,
            Err(e) => {
                error!("Ошибка перечисления устройств вывода: {}", e);
                DeviceMap::new()
            }
        }
    }

    async fn default_output_device(&self) -> Option<AudioDevice> {
        let result = run_blocking(|| {
            let _com = ComScope::enter()?;
            let enumerator = Self::enumerator()?;
            let device = unsafe { enumerator.GetDefaultAudioEndpoint(eRender, eMultimedia)? };
            Self::describe(&device)
        })
        .await;

        match result {
            Ok(device) => Some(device),
            Err(e) => {
                error!("Ошибка получения устройства вывода по умолчанию: {}", e);
                None
            }
        }
    }

    async fn get_volume(&self, id: &DeviceId) -> Volume {
        let target = id.clone();
        let result = run_blocking(move || {
            let _com = ComScope::enter()?;
            match Self::endpoint_volume(&target)? {
                Some(volume) => Ok(Some(unsafe { volume.GetMasterVolumeLevelScalar()? })),
                None => Ok(None),
            }
        })
        .await;

        match result {
            Ok(Some(scalar)) => Volume::from_scalar(scalar),
            Ok(None) => {
                warn!("Устройство {} не найдено", id);
                Volume::MIN
            }
            Err(e) => {
                error!("Ошибка получения громкости {}: {}", id, e);
                Volume::MIN
            }
        }
    }

    async fn set_volume(&self, id: &DeviceId, percent: i32) {
        let volume = Volume::clamped(percent);
        let target = id.clone();
        let result = run_blocking(move || {
            let _com = ComScope::enter()?;
            match Self::endpoint_volume(&target)? {
                Some(endpoint) => {
                    unsafe {
                        endpoint.SetMasterVolumeLevelScalar(volume.to_scalar(), std::ptr::null())?
                    };
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await;

        match result {
            Ok(true) => debug!("Громкость {} -> {}", id, volume),
            Ok(false) => warn!("Устройство {} не найдено, громкость не изменена", id),
            Err(e) => error!("Ошибка установки громкости {}: {}", id, e),
        }
    }

    async fn assign_process_device(&self, pid: ProcessId, id: &DeviceId) -> Result<()> {
        let target = id.clone();
        run_blocking(move || Self::assign_blocking(pid, &target)).await
    }

    async fn device_exists(&self, id: &DeviceId) -> bool {
        let target = id.clone();
        let result = run_blocking(move || {
            let _com = ComScope::enter()?;
            Ok(Self::find_active(&target)?.is_some())
        })
        .await;

        result.unwrap_or_else(|e| {
            error!("Ошибка проверки устройства {}: {}", id, e);
            false
        })
    }
}
