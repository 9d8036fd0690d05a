use ash::vk;
use log::debug;

use crate::gpu::{ContextInfo, Result, Size};

/// Swapchain of the host surface and one view per image.
pub(super) struct Swapchain {
    pub(super) handle: vk::SwapchainKHR,
    pub(super) images: Vec<vk::Image>,
    pub(super) views: Vec<vk::ImageView>,
    pub(super) format: vk::SurfaceFormatKHR,
    pub(super) extent: vk::Extent2D,
}

pub(super) struct SwapchainTarget<'a> {
    pub device: &'a ash::Device,
    pub surface_loader: &'a ash::khr::surface::Instance,
    pub swapchain_loader: &'a ash::khr::swapchain::Device,
    pub pdevice: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, size: Size) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: size
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: size
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn choose_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .unwrap_or(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        })
}

fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && modes.contains(&vk::PresentModeKHR::IMMEDIATE) {
        vk::PresentModeKHR::IMMEDIATE
    } else {
        vk::PresentModeKHR::FIFO
    }
}

impl Swapchain {
    /// Builds a swapchain sized to `size`, retiring `old` if it is not null.
    ///
    /// # Safety
    /// No GPU work may still reference images of `old`.
    pub(super) unsafe fn create(
        target: &SwapchainTarget<'_>,
        info: &ContextInfo,
        size: Size,
        old: vk::SwapchainKHR,
    ) -> Result<Self> {
        let caps = target
            .surface_loader
            .get_physical_device_surface_capabilities(target.pdevice, target.surface)?;
        let formats = target
            .surface_loader
            .get_physical_device_surface_formats(target.pdevice, target.surface)?;
        let present_modes = target
            .surface_loader
            .get_physical_device_surface_present_modes(target.pdevice, target.surface)?;

        let extent = choose_extent(&caps, size);
        let format = choose_format(&formats);
        let present_mode = choose_present_mode(&present_modes, info.vsync);

        let mut image_count = info.buffering.image_count().max(caps.min_image_count);
        if caps.max_image_count != 0 {
            image_count = image_count.min(caps.max_image_count);
        }

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(target.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            )
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);

        let handle = target.swapchain_loader.create_swapchain(&create_info, None)?;
        let images = match target.swapchain_loader.get_swapchain_images(handle) {
            Ok(images) => images,
            Err(err) => {
                target.swapchain_loader.destroy_swapchain(handle, None);
                return Err(err.into());
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );
            match target.device.create_image_view(&view_info, None) {
                Ok(view) => views.push(view),
                Err(err) => {
                    for view in views {
                        target.device.destroy_image_view(view, None);
                    }
                    target.swapchain_loader.destroy_swapchain(handle, None);
                    return Err(err.into());
                }
            }
        }

        debug!(
            "swapchain {}x{} with {} images ({:?}, {:?})",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Ok(Self {
            handle,
            images,
            views,
            format,
            extent,
        })
    }

    /// # Safety
    /// The device must be idle with respect to this swapchain's images.
    pub(super) unsafe fn destroy(
        self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        for view in self.views {
            device.destroy_image_view(view, None);
        }
        swapchain_loader.destroy_swapchain(self.handle, None);
    }
}
