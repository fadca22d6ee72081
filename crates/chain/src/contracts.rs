//! Contract bindings for the Superlend (Aave V3) deployment on Etherlink.
//!
//! Read-side bindings cover the addresses provider, pool, oracle and data
//! provider. The write side is the FlashLiquidations helper, which
//! flash-borrows the debt asset, liquidates, swaps the seized collateral on
//! IguanaDEX and repays in one transaction.

use alloy::primitives::{address, Address};
use alloy::sol;

/// Superlend PoolAddressesProvider on Etherlink mainnet.
pub const POOL_ADDRESSES_PROVIDER: Address = address!("5ccF60c7E10547c5389E9cBFf543E5D0Db9F4feC");

/// FlashLiquidations helper on Etherlink mainnet.
pub const LIQUIDATION_HELPER: Address = address!("3E6c69d19Bb2ba159dC6ebfb28FD81e697363311");

sol! {
    /// Registry of the protocol's contract addresses.
    #[sol(rpc)]
    interface IPoolAddressesProvider {
        function getPool() external view returns (address);
        function getPriceOracle() external view returns (address);
        function getPoolDataProvider() external view returns (address);
    }

    /// Aave V3 Pool (read subset).
    #[sol(rpc)]
    interface IPool {
        function getReservesList() external view returns (address[] memory);

        function getUserAccountData(address user)
            external
            view
            returns (
                uint256 totalCollateralBase,
                uint256 totalDebtBase,
                uint256 availableBorrowsBase,
                uint256 currentLiquidationThreshold,
                uint256 ltv,
                uint256 healthFactor
            );
    }

    /// Aave V3 price oracle.
    #[sol(rpc)]
    interface IAaveOracle {
        function BASE_CURRENCY_UNIT() external view returns (uint256);
        function getAssetsPrices(address[] calldata assets) external view returns (uint256[] memory);
    }

    /// Aave V3 protocol data provider.
    #[sol(rpc)]
    interface IPoolDataProvider {
        function getReserveConfigurationData(address asset)
            external
            view
            returns (
                uint256 decimals,
                uint256 ltv,
                uint256 liquidationThreshold,
                uint256 liquidationBonus,
                uint256 reserveFactor,
                bool usageAsCollateralEnabled,
                bool borrowingEnabled,
                bool stableBorrowRateEnabled,
                bool isActive,
                bool isFrozen
            );

        function getUserReserveData(address asset, address user)
            external
            view
            returns (
                uint256 currentATokenBalance,
                uint256 currentStableDebt,
                uint256 currentVariableDebt,
                uint256 principalStableDebt,
                uint256 scaledVariableDebt,
                uint256 stableBorrowRate,
                uint256 liquidityRate,
                uint40 stableRateLastUpdated,
                bool usageAsCollateralEnabled
            );
    }

    #[sol(rpc)]
    interface IERC20Metadata {
        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
    }

    /// Flash-loan liquidation helper.
    #[sol(rpc)]
    interface IFlashLiquidations {
        function executeLiquidation(
            address debtToken,
            uint256 amount,
            address collateralToken,
            address user,
            uint24 poolFee1,
            uint24 poolFee2,
            address pathToken,
            bool usePath
        ) external;
    }
}
